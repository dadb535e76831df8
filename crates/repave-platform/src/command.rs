use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

/// Runs a command expected to succeed; a non-zero exit is folded into the
/// error together with the captured streams, since winget and the AppX
/// cmdlets put their diagnostics there.
pub fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = capture_command(command, context_message)?;
    if output.success {
        return Ok(());
    }
    Err(anyhow!(
        "{context_message}: stdout='{}' stderr='{}'",
        output.stdout.trim(),
        output.stderr.trim()
    ))
}

/// Like [`run_command`] but hands the exit status and streams back to the
/// caller; winget and the AppX cmdlets communicate through stdout/stderr text
/// even on failure.
pub fn capture_command(command: &mut Command, context_message: &str) -> Result<CapturedOutput> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    Ok(CapturedOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

pub(crate) fn escape_ps_single_quote(value: &str) -> String {
    value.replace('\'', "''")
}

pub(crate) fn escape_ps_single_quote_path(path: &Path) -> String {
    escape_ps_single_quote(&path.to_string_lossy())
}
