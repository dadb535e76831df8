use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use repave_core::{ReconcileRequest, RepaveManifest, RetryState};

/// CLI-flag overrides layered on top of the manifest.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub reinstall: Option<bool>,
    pub package: Option<String>,
    pub app_id: Option<String>,
    pub app_name: Option<String>,
    pub source: Option<String>,
    pub by_name: bool,
    pub max_attempts: Option<u32>,
    pub settle_delay_seconds: Option<u64>,
}

pub fn load_manifest(path: &Path) -> Result<RepaveManifest> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read manifest {}", path.display()))?;
    RepaveManifest::from_toml_str(&raw)
        .with_context(|| format!("invalid manifest {}", path.display()))
}

/// Applies overrides on top of the validated manifest. Overrides can break
/// invariants the manifest parser already checked, so the combination is
/// re-validated here.
pub fn build_request(
    manifest: &RepaveManifest,
    overrides: &RunOverrides,
) -> Result<ReconcileRequest> {
    let mut request = ReconcileRequest::from_manifest(manifest)?;

    if let Some(reinstall) = overrides.reinstall {
        request.reinstall = reinstall;
    }
    if let Some(package) = &overrides.package {
        request.package_name = package.clone();
    }
    if let Some(app_id) = &overrides.app_id {
        request.app.id = app_id.clone();
    }
    if let Some(app_name) = &overrides.app_name {
        request.app.name = Some(app_name.clone());
    }
    if let Some(source) = &overrides.source {
        request.app.source = source.clone();
    }
    if overrides.by_name {
        request.app.install_by_name = true;
    }

    if request.package_name.trim().is_empty() {
        return Err(anyhow!("package name must not be empty"));
    }
    if request.app.id.trim().is_empty() {
        return Err(anyhow!("app id must not be empty"));
    }
    if request.app.source.trim().is_empty() {
        return Err(anyhow!("app source must not be empty"));
    }
    if request.app.install_by_name
        && !request
            .app
            .name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    {
        return Err(anyhow!("--by-name requires an app name"));
    }

    let max_attempts = overrides
        .max_attempts
        .unwrap_or_else(|| request.retry.max_attempts());
    let settle_delay = overrides
        .settle_delay_seconds
        .unwrap_or_else(|| request.retry.settle_delay().as_secs());
    request.retry = RetryState::new(max_attempts, settle_delay)?;

    Ok(request)
}
