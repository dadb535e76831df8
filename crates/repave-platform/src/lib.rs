mod appx;
mod command;
mod winget;

pub use appx::PowerShellAppxStore;
pub use command::{capture_command, run_command, CapturedOutput};
pub use winget::{WingetCli, DEFAULT_WINGET_BINARY};

#[cfg(test)]
mod tests;
