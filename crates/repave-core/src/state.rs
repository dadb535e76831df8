use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

/// Installed/staged status of a named AppX package across all accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackagePresence {
    Installed,
    NotInstalled,
    /// A record exists only for the machine account. This is the footprint of
    /// a half-finished install and must never count as installed.
    SystemStaged,
}

impl PackagePresence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::NotInstalled => "not-installed",
            Self::SystemStaged => "system-staged",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "installed" => Ok(Self::Installed),
            "not-installed" => Ok(Self::NotInstalled),
            "system-staged" => Ok(Self::SystemStaged),
            _ => Err(anyhow!("invalid package presence: {value}")),
        }
    }
}

/// Snapshot of one package's per-user install records. Built fresh on every
/// query and discarded after each decision point; never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageState {
    pub name: String,
    pub presence: PackagePresence,
    /// Account identifiers holding an install record, in enumeration order.
    pub users: Vec<String>,
    pub install_location: Option<PathBuf>,
}

impl PackageState {
    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            presence: PackagePresence::NotInstalled,
            users: Vec::new(),
            install_location: None,
        }
    }
}

/// Machine-wide provisioning record, independent of any per-user install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedPackageState {
    pub display_name: String,
    /// Opaque handle the OS expects back for removal.
    pub package_identifier: String,
}

/// Classified reason a removal call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalFailure {
    /// The package manifest registration is corrupt; re-registering it from
    /// the on-disk install location unblocks removal. The only recoverable
    /// failure class.
    NeedsReregistration,
    PathNotFound,
    Other,
}

impl RemovalFailure {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsReregistration => "needs-reregistration",
            Self::PathNotFound => "path-not-found",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveError {
    pub failure: RemovalFailure,
    pub detail: String,
}

impl fmt::Display for RemoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "removal failed ({}): {}", self.failure.as_str(), self.detail)
    }
}

impl std::error::Error for RemoveError {}

/// Outcome of a removal attempt after the post-removal query confirmed or
/// denied convergence. `NotInstalled` is only reported when the follow-up
/// query independently showed absence across all accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    NotInstalled,
    Failed(RemovalFailure),
}

/// Result of validating the external package manager binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Passed {
        binary_path: PathBuf,
        version: String,
    },
    /// The manager is missing, or present but not executable under the
    /// current account. Either way no install attempt may follow.
    Failed { detail: String },
}

impl ProbeOutcome {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }
}
