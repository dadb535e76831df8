use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use repave_core::{AppTarget, ProbeOutcome};
use repave_engine::AppInstaller;
use semver::Version;

use crate::command::{capture_command, run_command};

pub const DEFAULT_WINGET_BINARY: &str = "winget.exe";

const WINDOWS_APPS_DIR: &str = r"C:\Program Files\WindowsApps";
const DESKTOP_APP_INSTALLER_PREFIX: &str = "Microsoft.DesktopAppInstaller_";
const NO_INSTALLED_PACKAGE_MARKER: &str = "No installed package found";

fn min_supported_version() -> Version {
    Version::new(1, 4, 0)
}

/// winget client. `probe` must pass before `is_app_installed`/`install_app`
/// are usable; a manager that is present for a user profile can still be
/// broken under the machine account, and the probe is what tells those apart.
pub struct WingetCli {
    binary_name: String,
    binary_path: Option<PathBuf>,
}

impl WingetCli {
    pub fn new(binary_name: impl Into<String>) -> Self {
        Self {
            binary_name: binary_name.into(),
            binary_path: None,
        }
    }

    pub fn binary_path(&self) -> Option<&Path> {
        self.binary_path.as_deref()
    }

    fn resolve_binary(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = self.resolve_from_windows_apps()? {
            return Ok(Some(path));
        }
        self.resolve_from_path()
    }

    /// The machine-account-visible install lives under WindowsApps. Several
    /// DesktopAppInstaller versions can be present at once; ordering is a
    /// deterministic descending sort with the first entry winning.
    fn resolve_from_windows_apps(&self) -> Result<Option<PathBuf>> {
        let apps_dir = Path::new(WINDOWS_APPS_DIR);
        if !apps_dir.is_dir() {
            return Ok(None);
        }

        let mut names = Vec::new();
        for entry in fs::read_dir(apps_dir)
            .with_context(|| format!("failed to read {}", apps_dir.display()))?
        {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }

        let Some(selected) = select_latest_installer_dir(names) else {
            return Ok(None);
        };
        let candidate = apps_dir.join(selected).join(&self.binary_name);
        if candidate.is_file() {
            Ok(Some(candidate))
        } else {
            Ok(None)
        }
    }

    fn resolve_from_path(&self) -> Result<Option<PathBuf>> {
        let mut command = Command::new("where.exe");
        command.arg(&self.binary_name);
        let output = capture_command(&mut command, "PATH lookup for winget failed")?;
        if !output.success {
            return Ok(None);
        }
        let Some(first) = output.stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
            return Ok(None);
        };
        let candidate = PathBuf::from(first);
        if candidate.is_file() {
            Ok(Some(candidate))
        } else {
            Ok(None)
        }
    }

    fn require_binary(&self) -> Result<&Path> {
        self.binary_path
            .as_deref()
            .ok_or_else(|| anyhow!("winget has not been probed; probe must pass before use"))
    }
}

impl AppInstaller for WingetCli {
    fn probe(&mut self) -> Result<ProbeOutcome> {
        if !cfg!(windows) {
            return Err(anyhow!("winget probing is supported only on Windows hosts"));
        }

        let Some(candidate) = self.resolve_binary()? else {
            return Ok(ProbeOutcome::Failed {
                detail: format!(
                    "{} was not found under WindowsApps or on PATH",
                    self.binary_name
                ),
            });
        };

        // Execution check: resolving a path is not enough, the binary can be
        // installed for a user context yet fail under the machine account
        // when its runtime dependencies are missing.
        let mut command = Command::new(&candidate);
        command.arg("--version");
        let output = match capture_command(&mut command, "winget version check failed") {
            Ok(output) => output,
            Err(err) => {
                return Ok(ProbeOutcome::Failed {
                    detail: format!("{err:#}"),
                });
            }
        };
        if !output.success {
            return Ok(ProbeOutcome::Failed {
                detail: format!(
                    "{} is present but not executable under this account: stderr='{}'",
                    candidate.display(),
                    output.stderr.trim()
                ),
            });
        }

        let reported = output.stdout.trim().to_string();
        let version = match parse_winget_version(&reported) {
            Ok(version) => version,
            Err(err) => {
                return Ok(ProbeOutcome::Failed {
                    detail: format!("could not parse winget version '{reported}': {err:#}"),
                });
            }
        };
        let minimum = min_supported_version();
        if version < minimum {
            return Ok(ProbeOutcome::Failed {
                detail: format!("winget {version} is older than the supported minimum {minimum}"),
            });
        }

        self.binary_path = Some(candidate.clone());
        Ok(ProbeOutcome::Passed {
            binary_path: candidate,
            version: reported,
        })
    }

    fn is_app_installed(&mut self, app: &AppTarget) -> Result<bool> {
        let binary = self.require_binary()?.to_path_buf();
        let mut command = build_winget_list_command(&binary, app);
        let output = capture_command(&mut command, "winget list failed")?;
        Ok(winget_reports_installed(&output.stdout, &app.id))
    }

    fn install_app(&mut self, app: &AppTarget) -> Result<()> {
        let binary = self.require_binary()?.to_path_buf();
        let mut command = build_winget_install_command(&binary, app);
        run_command(
            &mut command,
            &format!("winget install failed for '{}'", app.id),
        )
    }
}

pub(crate) fn build_winget_list_command(binary: &Path, app: &AppTarget) -> Command {
    let mut command = Command::new(binary);
    command
        .arg("list")
        .arg("--id")
        .arg(&app.id)
        .arg("--source")
        .arg(&app.source)
        .arg("--accept-source-agreements");
    command
}

pub(crate) fn build_winget_install_command(binary: &Path, app: &AppTarget) -> Command {
    let mut command = Command::new(binary);
    command.arg("install");
    // Id lookup is unreliable for some catalog entries; name search is the
    // documented workaround and is only used when explicitly requested.
    if app.install_by_name {
        if let Some(name) = &app.name {
            command.arg("--name").arg(name);
        } else {
            command.arg("--id").arg(&app.id);
        }
    } else {
        command.arg("--id").arg(&app.id);
    }
    command
        .arg("--accept-package-agreements")
        .arg("--accept-source-agreements")
        .arg("--source")
        .arg(&app.source)
        .arg("--scope")
        .arg("machine");
    command
}

/// The one place that reads winget's human-oriented list output. winget has
/// no machine-readable mode, so the contract is two substrings: the explicit
/// "no package" marker and the app identifier itself.
pub(crate) fn winget_reports_installed(stdout: &str, app_id: &str) -> bool {
    if stdout.contains(NO_INSTALLED_PACKAGE_MARKER) {
        return false;
    }
    let needle = app_id.to_ascii_lowercase();
    stdout.to_ascii_lowercase().contains(&needle)
}

pub(crate) fn select_latest_installer_dir(names: Vec<String>) -> Option<String> {
    let mut candidates: Vec<String> = names
        .into_iter()
        .filter(|name| name.starts_with(DESKTOP_APP_INSTALLER_PREFIX))
        .collect();
    candidates.sort();
    candidates.reverse();
    candidates.into_iter().next()
}

/// winget reports a four-part version (`v1.22.11261.0`); the minimum-version
/// gate compares on the first three parts.
pub(crate) fn parse_winget_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    let mut parts = trimmed.split('.');
    let major = parse_version_part(parts.next(), raw)?;
    let minor = parse_version_part(parts.next(), raw)?;
    let patch = match parts.next() {
        Some(part) => parse_version_part(Some(part), raw)?,
        None => 0,
    };
    Ok(Version::new(major, minor, patch))
}

fn parse_version_part(part: Option<&str>, raw: &str) -> Result<u64> {
    part.ok_or_else(|| anyhow!("winget version has too few components: {raw}"))?
        .parse::<u64>()
        .with_context(|| format!("winget version component is not numeric: {raw}"))
}
