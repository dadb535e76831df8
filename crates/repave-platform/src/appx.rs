use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{anyhow, Context, Result};
use repave_core::{
    PackagePresence, PackageState, ProvisionedPackageState, RemovalFailure, RemoveError,
};
use repave_engine::PackageStore;
use serde::Deserialize;

use crate::command::{capture_command, escape_ps_single_quote, escape_ps_single_quote_path};

const SYSTEM_ACCOUNT_SID: &str = "S-1-5-18";

/// HRESULT the AppX stack reports when the manifest registration is corrupt
/// and must be rebuilt before removal can proceed.
const HRESULT_NEEDS_REREGISTRATION: &str = "0x80073CFA";
/// HRESULT for a removal that cannot find the package payload on disk.
const HRESULT_PACKAGE_PATH_NOT_FOUND: &str = "0x80073CF1";

/// AppX store backed by `powershell -NoProfile -Command`. Queries come back
/// as compact JSON (`ConvertTo-Json`); only removal errors are classified
/// from text because the cmdlets surface no structured error there.
pub struct PowerShellAppxStore {
    powershell_bin: String,
}

impl PowerShellAppxStore {
    pub fn new() -> Result<Self> {
        if !cfg!(windows) {
            return Err(anyhow!(
                "the AppX package store is available only on Windows hosts"
            ));
        }
        Ok(Self {
            powershell_bin: "powershell".to_string(),
        })
    }

    fn run_ps(&self, script: String, context_message: &str) -> Result<crate::CapturedOutput> {
        let mut command = Command::new(&self.powershell_bin);
        command.arg("-NoProfile").arg("-Command").arg(script);
        capture_command(&mut command, context_message)
    }
}

impl PackageStore for PowerShellAppxStore {
    fn query_package(&mut self, name: &str) -> Result<PackageState> {
        let escaped = escape_ps_single_quote(name);
        let script = format!(
            "$ErrorActionPreference = 'Stop'; \
             $p = Get-AppxPackage -AllUsers -Name '{escaped}' | Select-Object -First 1; \
             if ($null -eq $p) {{ '{{\"found\":false}}' }} else {{ \
             $u = @($p.PackageUserInformation | ForEach-Object {{ '{{0}}|{{1}}' -f $_.UserSecurityId.Sid, $_.InstallState }}); \
             @{{ found = $true; name = $p.Name; installLocation = \"$($p.InstallLocation)\"; users = $u }} | ConvertTo-Json -Compress }}"
        );
        let output = self.run_ps(script, "package query failed")?;
        if !output.success {
            return Err(anyhow!(
                "package query failed: stderr='{}'",
                output.stderr.trim()
            ));
        }
        parse_package_query(output.stdout.trim(), name)
            .with_context(|| format!("package query returned unusable output for '{name}'"))
    }

    fn remove_package(&mut self, name: &str) -> std::result::Result<(), RemoveError> {
        let escaped = escape_ps_single_quote(name);
        let script = format!(
            "$ErrorActionPreference = 'Stop'; \
             Get-AppxPackage -AllUsers -Name '{escaped}' | Remove-AppxPackage -AllUsers"
        );
        let output = self
            .run_ps(script, "package removal failed")
            .map_err(|err| RemoveError {
                failure: RemovalFailure::Other,
                detail: format!("{err:#}"),
            })?;
        if output.success {
            return Ok(());
        }
        Err(RemoveError {
            failure: classify_removal_error(&output.stderr),
            detail: output.stderr.trim().to_string(),
        })
    }

    fn register_package(&mut self, name: &str, install_location: &Path) -> Result<()> {
        let manifest_path = install_location.join("AppxManifest.xml");
        let escaped = escape_ps_single_quote_path(&manifest_path);
        let script = format!(
            "$ErrorActionPreference = 'Stop'; \
             Add-AppxPackage -Register '{escaped}' -DisableDevelopmentMode"
        );
        let output = self.run_ps(script, "package re-registration failed")?;
        if !output.success {
            return Err(anyhow!(
                "package re-registration failed for '{}': stderr='{}'",
                name,
                output.stderr.trim()
            ));
        }
        Ok(())
    }

    fn query_provisioned(&mut self, name: &str) -> Result<Option<ProvisionedPackageState>> {
        let escaped = escape_ps_single_quote(name);
        let script = format!(
            "$ErrorActionPreference = 'Stop'; \
             $p = Get-AppxProvisionedPackage -Online | Where-Object {{ $_.DisplayName -eq '{escaped}' }} | Select-Object -First 1; \
             if ($null -eq $p) {{ '{{\"found\":false}}' }} else {{ \
             @{{ found = $true; displayName = $p.DisplayName; packageName = \"$($p.PackageName)\" }} | ConvertTo-Json -Compress }}"
        );
        let output = self.run_ps(script, "provisioned package query failed")?;
        if !output.success {
            return Err(anyhow!(
                "provisioned package query failed: stderr='{}'",
                output.stderr.trim()
            ));
        }
        parse_provisioned_query(output.stdout.trim())
            .with_context(|| format!("provisioned query returned unusable output for '{name}'"))
    }

    fn remove_provisioned(&mut self, package_identifier: &str) -> Result<()> {
        let escaped = escape_ps_single_quote(package_identifier);
        let script = format!(
            "$ErrorActionPreference = 'Stop'; \
             Remove-AppxProvisionedPackage -Online -PackageName '{escaped}' | Out-Null"
        );
        let output = self.run_ps(script, "provisioned package removal failed")?;
        if !output.success {
            return Err(anyhow!(
                "provisioned package removal failed for '{}': stderr='{}'",
                package_identifier,
                output.stderr.trim()
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct RawPackageQuery {
    found: bool,
    name: Option<String>,
    #[serde(rename = "installLocation")]
    install_location: Option<String>,
    #[serde(default)]
    users: Vec<String>,
}

pub(crate) fn parse_package_query(raw: &str, requested_name: &str) -> Result<PackageState> {
    let parsed: RawPackageQuery =
        serde_json::from_str(raw).context("package query output is not valid JSON")?;
    if !parsed.found {
        return Ok(PackageState::absent(requested_name));
    }

    let mut users = Vec::with_capacity(parsed.users.len());
    for record in &parsed.users {
        let Some((sid, _state)) = record.split_once('|') else {
            return Err(anyhow!("invalid package user record: {record}"));
        };
        users.push(sid.to_string());
    }

    Ok(PackageState {
        name: parsed.name.unwrap_or_else(|| requested_name.to_string()),
        presence: classify_presence(&parsed.users)?,
        users,
        install_location: parsed
            .install_location
            .filter(|location| !location.trim().is_empty())
            .map(PathBuf::from),
    })
}

/// A package counts as installed only when a real (non-machine) account holds
/// a completed record. Anything else that still has records is the residue of
/// an incomplete install and is classified as system-staged.
pub(crate) fn classify_presence(user_records: &[String]) -> Result<PackagePresence> {
    for record in user_records {
        let Some((sid, state)) = record.split_once('|') else {
            return Err(anyhow!("invalid package user record: {record}"));
        };
        if sid != SYSTEM_ACCOUNT_SID && state.trim() == "Installed" {
            return Ok(PackagePresence::Installed);
        }
    }
    Ok(PackagePresence::SystemStaged)
}

pub(crate) fn classify_removal_error(stderr: &str) -> RemovalFailure {
    if stderr.contains(HRESULT_NEEDS_REREGISTRATION) {
        return RemovalFailure::NeedsReregistration;
    }
    if stderr.contains(HRESULT_PACKAGE_PATH_NOT_FOUND) {
        return RemovalFailure::PathNotFound;
    }
    RemovalFailure::Other
}

#[derive(Debug, Deserialize)]
struct RawProvisionedQuery {
    found: bool,
    #[serde(rename = "displayName")]
    display_name: Option<String>,
    #[serde(rename = "packageName")]
    package_name: Option<String>,
}

pub(crate) fn parse_provisioned_query(raw: &str) -> Result<Option<ProvisionedPackageState>> {
    let parsed: RawProvisionedQuery =
        serde_json::from_str(raw).context("provisioned query output is not valid JSON")?;
    if !parsed.found {
        return Ok(None);
    }

    let display_name = parsed
        .display_name
        .ok_or_else(|| anyhow!("provisioned record is missing displayName"))?;
    let package_identifier = parsed
        .package_name
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("provisioned record is missing packageName"))?;
    Ok(Some(ProvisionedPackageState {
        display_name,
        package_identifier,
    }))
}
