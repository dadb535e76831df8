use std::io::{stdout, IsTerminal};
use std::time::Duration;

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{ProgressBar, ProgressStyle};
use repave_core::{
    PackageState, ProbeOutcome, ProvisionedPackageState, ReconcileEvent, ReconcileReport, Severity,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OutputStyle {
    Plain,
    Rich,
}

pub fn output_style(force_plain: bool) -> OutputStyle {
    if force_plain || std::env::var_os("NO_COLOR").is_some() || !stdout().is_terminal() {
        OutputStyle::Plain
    } else {
        OutputStyle::Rich
    }
}

#[derive(Copy, Clone, Debug)]
pub struct Renderer {
    style: OutputStyle,
}

impl Renderer {
    pub fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub fn start_spinner(&self, label: &str, package: &str) -> Option<ProgressBar> {
        if self.style != OutputStyle::Rich {
            return None;
        }
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan.bold} {msg}") {
            spinner.set_style(style.tick_chars("|/-\\ "));
        }
        spinner.set_message(format!("{label} {package}"));
        spinner.enable_steady_tick(Duration::from_millis(80));
        Some(spinner)
    }

    pub fn finish_spinner(&self, spinner: Option<ProgressBar>) {
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
    }

    pub fn print_line(&self, line: &str) {
        println!("{line}");
    }

    pub fn print_status(&self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub fn print_report(&self, report: &ReconcileReport) {
        for event in &report.events {
            if event.severity == Severity::Verbose {
                continue;
            }
            println!("{}", render_event_line(self.style, event));
        }
        let status = if report.converged && !report.errored {
            "ok"
        } else {
            "fail"
        };
        self.print_status(status, &format_run_summary(report));
    }
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => format!("{status}: {message}"),
        OutputStyle::Rich => format!("{} {message}", colorize(status_style(status), status)),
    }
}

pub(crate) fn render_event_line(style: OutputStyle, event: &ReconcileEvent) -> String {
    let tag = severity_tag(event.severity);
    match style {
        OutputStyle::Plain => format!("{tag} {} {}", event.component, event.message),
        OutputStyle::Rich => format!(
            "{} {} {}",
            colorize(severity_style(event.severity), tag),
            event.component,
            event.message
        ),
    }
}

pub(crate) fn format_run_summary(report: &ReconcileReport) -> String {
    // Removal-only runs and probe failures never enter the install loop, so
    // attempt and installer counts would only mislead there.
    if report.attempts_used == 0 {
        return if report.converged && !report.errored {
            format!("{} removed for all users", report.package)
        } else if report.converged {
            format!("{} removed with errors", report.package)
        } else {
            format!("{} was not reconciled", report.package)
        };
    }
    if report.converged && !report.errored {
        format!(
            "{} converged after {} attempt(s), {} install call(s)",
            report.package, report.attempts_used, report.installer_invocations
        )
    } else if report.converged {
        format!(
            "{} converged with errors after {} attempt(s)",
            report.package, report.attempts_used
        )
    } else {
        format!(
            "{} did not converge after {} attempt(s)",
            report.package, report.attempts_used
        )
    }
}

pub(crate) fn format_status_lines(
    state: &PackageState,
    provisioned: Option<&ProvisionedPackageState>,
    probe: &ProbeOutcome,
    manager_installed: Option<bool>,
    app_id: &str,
) -> Vec<String> {
    let mut lines = Vec::new();

    let mut package_line = format!("package {}: {}", state.name, state.presence.as_str());
    if !state.users.is_empty() {
        package_line.push_str(&format!(" ({} user record(s))", state.users.len()));
    }
    lines.push(package_line);

    if let Some(location) = &state.install_location {
        lines.push(format!("install location: {}", location.display()));
    }

    match provisioned {
        Some(provisioned) => lines.push(format!("provisioned: {}", provisioned.package_identifier)),
        None => lines.push("provisioned: none".to_string()),
    }

    match probe {
        ProbeOutcome::Passed {
            binary_path,
            version,
        } => lines.push(format!("manager: winget {} at {}", version, binary_path.display())),
        ProbeOutcome::Failed { detail } => lines.push(format!("manager: unavailable ({detail})")),
    }

    match manager_installed {
        Some(true) => lines.push(format!("app {app_id}: installed")),
        Some(false) => lines.push(format!("app {app_id}: not installed")),
        None => lines.push(format!("app {app_id}: unknown (manager unavailable)")),
    }

    lines
}

fn severity_tag(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "info",
        Severity::Warning => "warn",
        Severity::Error => "error",
        Severity::Verbose => "trace",
    }
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Info => Style::new().fg_color(Some(AnsiColor::BrightBlue.into())),
        Severity::Warning => Style::new().fg_color(Some(AnsiColor::BrightYellow.into())),
        Severity::Error => Style::new()
            .fg_color(Some(AnsiColor::BrightRed.into()))
            .effects(Effects::BOLD),
        Severity::Verbose => Style::new().effects(Effects::DIMMED),
    }
}

fn status_style(status: &str) -> Style {
    match status {
        "ok" => Style::new()
            .fg_color(Some(AnsiColor::BrightGreen.into()))
            .effects(Effects::BOLD),
        "fail" => Style::new()
            .fg_color(Some(AnsiColor::BrightRed.into()))
            .effects(Effects::BOLD),
        _ => Style::new().effects(Effects::BOLD),
    }
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
