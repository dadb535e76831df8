use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use repave_core::{AppTarget, PackageState, ProbeOutcome, ProvisionedPackageState, RemoveError};

/// Seam to the OS package database. Every call is a fresh round trip; the
/// engine never caches results across decision points.
pub trait PackageStore {
    /// Install records for `name` across all user accounts, not just the
    /// invoking session's account.
    fn query_package(&mut self, name: &str) -> Result<PackageState>;

    /// Issues the removal call for all accounts. Classified failures come
    /// back as `RemoveError`; the engine decides which are recoverable.
    fn remove_package(&mut self, name: &str) -> std::result::Result<(), RemoveError>;

    /// Re-registers the package manifest from its on-disk install location
    /// for all accounts.
    fn register_package(&mut self, name: &str, install_location: &Path) -> Result<()>;

    fn query_provisioned(&mut self, name: &str) -> Result<Option<ProvisionedPackageState>>;

    fn remove_provisioned(&mut self, package_identifier: &str) -> Result<()>;
}

/// Seam to the external package manager binary.
pub trait AppInstaller {
    /// Resolve and validate the manager binary. A failed probe must prevent
    /// every downstream install attempt.
    fn probe(&mut self) -> Result<ProbeOutcome>;

    /// The manager's own view of whether the app is installed.
    fn is_app_installed(&mut self, app: &AppTarget) -> Result<bool>;

    fn install_app(&mut self, app: &AppTarget) -> Result<()>;
}

/// Blocking-sleep seam so tests can run the loop without real settle delays.
pub trait Clock {
    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingClock;

impl Clock for BlockingClock {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
