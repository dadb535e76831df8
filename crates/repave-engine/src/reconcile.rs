use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use repave_core::{
    PackagePresence, ProbeOutcome, ReconcileReport, ReconcileRequest, RemovalFailure,
    RemovalOutcome,
};

use crate::query::settled_package_query;
use crate::store::{AppInstaller, Clock, PackageStore};

const QUERY: &str = "query";
const REMOVE: &str = "remove";
const REGISTER: &str = "register";
const PROVISIONED: &str = "provisioned";
const PROBE: &str = "probe";
const INSTALL: &str = "install";
const VERIFY: &str = "verify";
const LOOP: &str = "loop";

/// Stations of one reconciliation run. The loop always reaches `Done`; there
/// is no path that exits mid-flight without the terminal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileState {
    Start,
    PackageRemoved,
    ProvisionedRemoved,
    ManagerProbed,
    Installed,
    Verified,
    Retry,
    Done,
}

impl ReconcileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::PackageRemoved => "package-removed",
            Self::ProvisionedRemoved => "provisioned-removed",
            Self::ManagerProbed => "manager-probed",
            Self::Installed => "installed",
            Self::Verified => "verified",
            Self::Retry => "retry",
            Self::Done => "done",
        }
    }
}

fn enter(report: &mut ReconcileReport, state: ReconcileState) {
    report.verbose(LOOP, format!("state -> {}", state.as_str()));
}

/// Runs the full reconciliation for one package: remove per-user installs,
/// remove the provisioned record, probe the manager, then install and verify
/// under a bounded retry. Non-fatal degradation lands in the report;
/// a failing OS introspection call is returned as `Err` and must abort the
/// run (introspection failures are never retried).
pub fn run_reconcile<S, I, C>(
    store: &mut S,
    installer: &mut I,
    clock: &mut C,
    request: &ReconcileRequest,
) -> Result<ReconcileReport>
where
    S: PackageStore,
    I: AppInstaller,
    C: Clock,
{
    let mut report = ReconcileReport::new(&request.package_name);
    let settle = request.retry.settle_delay();
    enter(&mut report, ReconcileState::Start);

    let package_absent = remove_package_phase(store, clock, request, settle, &mut report)?;
    enter(&mut report, ReconcileState::PackageRemoved);

    remove_provisioned_phase(store, &request.package_name, &mut report);
    enter(&mut report, ReconcileState::ProvisionedRemoved);

    if !request.reinstall {
        report.converged = package_absent;
        if !package_absent {
            report.error(LOOP, "package is still present after removal phase");
        }
        enter(&mut report, ReconcileState::Done);
        return Ok(report);
    }

    match installer.probe() {
        Ok(ProbeOutcome::Passed {
            binary_path,
            version,
        }) => {
            report.info(
                PROBE,
                format!("package manager {} at {}", version, binary_path.display()),
            );
        }
        Ok(ProbeOutcome::Failed { detail }) => {
            // A broken or missing manager short-circuits the entire install
            // phase; retrying against it would never converge.
            report.error(PROBE, format!("package manager probe failed: {detail}"));
            enter(&mut report, ReconcileState::Done);
            return Ok(report);
        }
        Err(err) => {
            report.error(PROBE, format!("package manager probe errored: {err:#}"));
            enter(&mut report, ReconcileState::Done);
            return Ok(report);
        }
    }
    enter(&mut report, ReconcileState::ManagerProbed);

    let mut retry = request.retry;
    loop {
        report.attempts_used = retry.attempt();

        let already = match installer.is_app_installed(&request.app) {
            Ok(installed) => installed,
            Err(err) => {
                report.warn(INSTALL, format!("manager install check failed: {err:#}"));
                false
            }
        };

        // The first attempt skips the installer when the manager already
        // reports the app; every retry re-invokes it unconditionally, which
        // the manager treats as a no-op for a healthy install.
        if retry.attempt() > 1 || !already {
            report.info(
                INSTALL,
                format!(
                    "installing '{}' from '{}' (attempt {}/{})",
                    request.app.id,
                    request.app.source,
                    retry.attempt(),
                    retry.max_attempts()
                ),
            );
            report.installer_invocations += 1;
            if let Err(err) = installer.install_app(&request.app) {
                report.error(INSTALL, format!("installer invocation failed: {err:#}"));
            }
        } else {
            report.info(INSTALL, "manager already reports the app; skipping install call");
        }
        enter(&mut report, ReconcileState::Installed);

        let verified = settled_package_query(store, clock, &request.package_name, settle)?;
        let manager_agrees = match installer.is_app_installed(&request.app) {
            Ok(installed) => installed,
            Err(err) => {
                report.warn(VERIFY, format!("manager install check failed: {err:#}"));
                false
            }
        };
        enter(&mut report, ReconcileState::Verified);

        if verified.presence == PackagePresence::Installed && manager_agrees {
            report.converged = true;
            report.info(
                VERIFY,
                format!("converged after {} attempt(s)", retry.attempt()),
            );
            break;
        }

        report.warn(
            VERIFY,
            format!(
                "not converged: package {}, manager reports installed: {}",
                verified.presence.as_str(),
                manager_agrees
            ),
        );

        if retry.exhausted() {
            report.error(
                LOOP,
                format!(
                    "install did not converge after {} attempt(s)",
                    retry.max_attempts()
                ),
            );
            break;
        }

        enter(&mut report, ReconcileState::Retry);
        retry = retry.next();
    }

    enter(&mut report, ReconcileState::Done);
    Ok(report)
}

/// Step 1: settle-query, remove, and recover via re-registration when the
/// removal reports a corrupt manifest registration. Returns whether the
/// package is confirmed absent afterwards.
fn remove_package_phase<S, C>(
    store: &mut S,
    clock: &mut C,
    request: &ReconcileRequest,
    settle: Duration,
    report: &mut ReconcileReport,
) -> Result<bool>
where
    S: PackageStore,
    C: Clock,
{
    let initial = settled_package_query(store, clock, &request.package_name, settle)?;
    match initial.presence {
        PackagePresence::NotInstalled => {
            report.info(QUERY, "package not installed for any user");
            return Ok(true);
        }
        presence => {
            report.info(
                QUERY,
                format!(
                    "package found ({}), user records: {}",
                    presence.as_str(),
                    initial.users.len()
                ),
            );
        }
    }

    match remove_with_confirmation(store, clock, &request.package_name, settle, report)? {
        RemovalOutcome::NotInstalled => {
            report.info(REMOVE, "removal confirmed for all users");
            Ok(true)
        }
        RemovalOutcome::Failed(RemovalFailure::NeedsReregistration) => {
            let Some(location) = initial.install_location.as_deref() else {
                report.error(
                    REGISTER,
                    "package needs re-registration but its install location is unknown",
                );
                return Ok(false);
            };
            let recovered = recover_with_reregistration(
                store,
                clock,
                &request.package_name,
                location,
                settle,
                report,
            )?;
            if recovered {
                report.info(REGISTER, "removal succeeded after re-registration");
            } else {
                report.error(REGISTER, "package still present after re-registration retry");
            }
            Ok(recovered)
        }
        RemovalOutcome::Failed(reason) => {
            report.error(REMOVE, format!("removal failed ({})", reason.as_str()));
            Ok(false)
        }
    }
}

/// Issues the removal call and then independently re-queries; a removal call
/// returning success is not trusted on its own.
fn remove_with_confirmation<S, C>(
    store: &mut S,
    clock: &mut C,
    name: &str,
    settle: Duration,
    report: &mut ReconcileReport,
) -> Result<RemovalOutcome>
where
    S: PackageStore,
    C: Clock,
{
    let call_result = store.remove_package(name);
    if let Err(remove_err) = &call_result {
        report.warn(REMOVE, remove_err.to_string());
    }

    let post = settled_package_query(store, clock, name, settle)?;
    if post.presence == PackagePresence::NotInstalled {
        return Ok(RemovalOutcome::NotInstalled);
    }

    Ok(RemovalOutcome::Failed(match call_result {
        Err(remove_err) => remove_err.failure,
        Ok(()) => RemovalFailure::Other,
    }))
}

/// The recovery path for `NeedsReregistration`: re-register the manifest from
/// its install location, then retry removal once. Registration exceptions
/// flag the report without unwinding so the loop still reaches `Done`.
fn recover_with_reregistration<S, C>(
    store: &mut S,
    clock: &mut C,
    name: &str,
    install_location: &Path,
    settle: Duration,
    report: &mut ReconcileReport,
) -> Result<bool>
where
    S: PackageStore,
    C: Clock,
{
    report.info(
        REGISTER,
        format!("re-registering manifest at {}", install_location.display()),
    );
    if let Err(err) = store.register_package(name, install_location) {
        report.error(REGISTER, format!("re-registration failed: {err:#}"));
        return Ok(false);
    }

    match remove_with_confirmation(store, clock, name, settle, report)? {
        RemovalOutcome::NotInstalled => Ok(true),
        RemovalOutcome::Failed(reason) => {
            report.warn(
                REGISTER,
                format!("removal after re-registration failed ({})", reason.as_str()),
            );
            Ok(false)
        }
    }
}

/// Step 2: the provisioned record is orthogonal to per-user installs and is
/// reconciled even when the per-user removal failed. Failures here are
/// flagged but never block later steps.
fn remove_provisioned_phase<S>(store: &mut S, name: &str, report: &mut ReconcileReport)
where
    S: PackageStore,
{
    match store.query_provisioned(name) {
        Ok(Some(provisioned)) => {
            report.info(
                PROVISIONED,
                format!(
                    "removing provisioned record '{}'",
                    provisioned.package_identifier
                ),
            );
            if let Err(err) = store.remove_provisioned(&provisioned.package_identifier) {
                report.error(
                    PROVISIONED,
                    format!("provisioned removal failed: {err:#}"),
                );
            }
        }
        Ok(None) => {
            report.info(PROVISIONED, "no provisioned record found");
        }
        Err(err) => {
            report.error(PROVISIONED, format!("provisioned query failed: {err:#}"));
        }
    }
}
