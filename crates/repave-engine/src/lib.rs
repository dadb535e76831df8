mod query;
mod reconcile;
mod store;

pub use query::settled_package_query;
pub use reconcile::{run_reconcile, ReconcileState};
pub use store::{AppInstaller, BlockingClock, Clock, PackageStore};
