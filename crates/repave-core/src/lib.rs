mod manifest;
mod report;
mod retry;
mod state;

pub use manifest::{AppTarget, ReconcileRequest, RepaveManifest};
pub use report::{ReconcileEvent, ReconcileReport, Severity};
pub use retry::RetryState;
pub use state::{
    PackagePresence, PackageState, ProbeOutcome, ProvisionedPackageState, RemovalFailure,
    RemovalOutcome, RemoveError,
};
