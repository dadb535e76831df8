use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use repave_core::{ReconcileReport, Severity};

/// Log file every run writes unless redirected with `--log-file`.
pub const DEFAULT_LOG_FILE: &str = "repave.log";

/// Append-only run log. One line per event:
/// `<unix-seconds> <severity 1-4> <component> <message>`.
pub struct LogSink {
    file: File,
}

impl LogSink {
    pub fn open(path: &Path, reset: bool) -> Result<Self> {
        let mut options = OpenOptions::new();
        options.create(true).write(true);
        if reset {
            options.truncate(true);
        } else {
            options.append(true);
        }
        let file = options
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        Ok(Self { file })
    }

    pub fn record_event(
        &mut self,
        severity: Severity,
        component: &str,
        message: &str,
    ) -> Result<()> {
        let line = format_log_line(unix_now(), severity, component, message);
        self.file
            .write_all(line.as_bytes())
            .context("failed writing log line")
    }

    pub fn record_report(&mut self, report: &ReconcileReport) -> Result<()> {
        for event in &report.events {
            self.record_event(event.severity, &event.component, &event.message)?;
        }
        Ok(())
    }
}

pub(crate) fn format_log_line(
    unix_seconds: u64,
    severity: Severity,
    component: &str,
    message: &str,
) -> String {
    // Messages may carry multi-line stderr; the log stays one line per event.
    let flattened = message.replace(['\r', '\n'], " ");
    format!(
        "{unix_seconds} {} {component} {}\n",
        severity.as_u8(),
        flattened.trim()
    )
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
