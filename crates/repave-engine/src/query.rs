use std::time::Duration;

use anyhow::Result;
use repave_core::{PackagePresence, PackageState};

use crate::store::{Clock, PackageStore};

/// Queries package state, and on a "found" result waits out the settle delay
/// and re-queries before trusting it. The OS can report a package present
/// while it is still tearing down a failed staging; a single query produces
/// false positives in exactly the window this tool runs in.
pub fn settled_package_query<S, C>(
    store: &mut S,
    clock: &mut C,
    name: &str,
    settle_delay: Duration,
) -> Result<PackageState>
where
    S: PackageStore,
    C: Clock,
{
    let first = store.query_package(name)?;
    if first.presence == PackagePresence::NotInstalled {
        return Ok(first);
    }

    clock.sleep(settle_delay);
    store.query_package(name)
}
