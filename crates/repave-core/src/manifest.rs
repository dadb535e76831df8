use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::retry::{RetryState, DEFAULT_MAX_ATTEMPTS, DEFAULT_SETTLE_DELAY_SECONDS};

/// The winget-side identity of the application being reconciled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppTarget {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_source")]
    pub source: String,
    /// Install by display name instead of id. Id lookup is unreliable for
    /// some catalog entries; name search is the documented workaround, never
    /// the default.
    #[serde(default)]
    pub install_by_name: bool,
}

fn default_source() -> String {
    "winget".to_string()
}

/// TOML description of a reconcile target. Every field can be overridden by
/// a CLI flag; the manifest exists so fleet deployments carry one reviewed
/// file instead of a flag soup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepaveManifest {
    /// AppX package family name to remove, e.g. `Microsoft.Todos`.
    pub package_name: String,
    #[serde(default = "default_reinstall")]
    pub reinstall: bool,
    pub app: AppTarget,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_settle_delay")]
    pub settle_delay_seconds: u64,
}

fn default_reinstall() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_settle_delay() -> u64 {
    DEFAULT_SETTLE_DELAY_SECONDS
}

impl RepaveManifest {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(input).context("failed to parse repave manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> Result<()> {
        if self.package_name.trim().is_empty() {
            return Err(anyhow!("package_name must not be empty"));
        }
        if self.app.id.trim().is_empty() {
            return Err(anyhow!("app.id must not be empty"));
        }
        if self.app.source.trim().is_empty() {
            return Err(anyhow!("app.source must not be empty"));
        }
        if self.app.install_by_name
            && !self
                .app
                .name
                .as_deref()
                .is_some_and(|name| !name.trim().is_empty())
        {
            return Err(anyhow!("app.install_by_name requires app.name to be set"));
        }
        if self.max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }
        Ok(())
    }
}

/// Fully resolved input to one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileRequest {
    pub package_name: String,
    pub app: AppTarget,
    pub reinstall: bool,
    pub retry: RetryState,
}

impl ReconcileRequest {
    pub fn from_manifest(manifest: &RepaveManifest) -> Result<Self> {
        Ok(Self {
            package_name: manifest.package_name.clone(),
            app: manifest.app.clone(),
            reinstall: manifest.reinstall,
            retry: RetryState::new(manifest.max_attempts, manifest.settle_delay_seconds)?,
        })
    }
}
