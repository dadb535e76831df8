use anyhow::{anyhow, Result};

/// Log severity, matching the 1-4 levels the log sink writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Verbose,
}

impl Severity {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Info => 1,
            Self::Warning => 2,
            Self::Error => 3,
            Self::Verbose => 4,
        }
    }

    pub fn parse(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Info),
            2 => Ok(Self::Warning),
            3 => Ok(Self::Error),
            4 => Ok(Self::Verbose),
            _ => Err(anyhow!("invalid severity level: {value}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileEvent {
    pub severity: Severity,
    pub component: String,
    pub message: String,
}

/// Accumulated outcome of one reconciliation run. Replaces process-wide
/// mutable flags: every step records its events here and the final flags are
/// read once at exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub package: String,
    pub attempts_used: u32,
    pub installer_invocations: u32,
    pub converged: bool,
    /// Set on any non-fatal degradation (failed removal, provisioned cleanup
    /// failure, retry exhaustion). Fatal introspection errors surface as
    /// `Err` from the loop instead.
    pub errored: bool,
    pub events: Vec<ReconcileEvent>,
}

impl ReconcileReport {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            attempts_used: 0,
            installer_invocations: 0,
            converged: false,
            errored: false,
            events: Vec::new(),
        }
    }

    pub fn info(&mut self, component: &str, message: impl Into<String>) {
        self.push(Severity::Info, component, message.into());
    }

    pub fn verbose(&mut self, component: &str, message: impl Into<String>) {
        self.push(Severity::Verbose, component, message.into());
    }

    pub fn warn(&mut self, component: &str, message: impl Into<String>) {
        self.push(Severity::Warning, component, message.into());
    }

    /// Records an error event and latches the `errored` flag.
    pub fn error(&mut self, component: &str, message: impl Into<String>) {
        self.errored = true;
        self.push(Severity::Error, component, message.into());
    }

    fn push(&mut self, severity: Severity, component: &str, message: String) {
        self.events.push(ReconcileEvent {
            severity,
            component: component.to_string(),
            message,
        });
    }
}
