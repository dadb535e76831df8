use std::time::Duration;

use anyhow::{anyhow, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_SETTLE_DELAY_SECONDS: u64 = 30;

/// Bounded retry counter for install reconciliation. Immutable: each
/// iteration consumes the current value and continues with the copy returned
/// by [`RetryState::next`], so the attempt count has a single owner and the
/// loop terminates regardless of external state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    /// 1-based attempt counter. Never exceeds `max_attempts`.
    attempt: u32,
    max_attempts: u32,
    settle_delay_seconds: u64,
}

impl RetryState {
    pub fn new(max_attempts: u32, settle_delay_seconds: u64) -> Result<Self> {
        if max_attempts == 0 {
            return Err(anyhow!("max_attempts must be at least 1"));
        }
        Ok(Self {
            attempt: 1,
            max_attempts,
            settle_delay_seconds,
        })
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_seconds)
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// The state for the following attempt. Callers must check
    /// [`RetryState::exhausted`] first; `next` saturates at the bound rather
    /// than stepping past it.
    pub fn next(&self) -> Self {
        Self {
            attempt: self.attempt.saturating_add(1).min(self.max_attempts),
            ..*self
        }
    }
}

impl Default for RetryState {
    fn default() -> Self {
        Self {
            attempt: 1,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            settle_delay_seconds: DEFAULT_SETTLE_DELAY_SECONDS,
        }
    }
}
