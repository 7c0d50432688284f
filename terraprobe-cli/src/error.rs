//! CLI-specific error types and exit code mapping

use terraprobe_core::error::{ConfigError, HarnessError};
use terraprobe_runner::RunnerError;

/// CLI-specific error type.
///
/// Each variant carries enough context for a user-friendly message.
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading, validation or context resolution failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// Scenario file could not be read, parsed or validated.
    #[error("scenario error: {0}")]
    Scenarios(#[from] RunnerError),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// The suite ran but not every scenario passed or was cleaned up.
    #[error("{failed} scenario(s) failed, {cleanup_failures} cleanup failure(s)")]
    ScenariosFailed {
        failed: usize,
        cleanup_failures: usize,
    },

    /// Logging or metrics setup failed.
    #[error("startup error: {0}")]
    Startup(#[from] anyhow::Error),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Success                                   |
    /// | 1    | Scenario failures / command error         |
    /// | 2    | Configuration or scenario file error      |
    /// | 10   | IO error                                  |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Scenarios(_) => 2,
            Self::Io(_) => 10,
            Self::ScenariosFailed { .. }
            | Self::Command(_)
            | Self::Startup(_)
            | Self::JsonSerialize(_) => 1,
        }
    }
}

impl From<HarnessError> for CliError {
    fn from(err: HarnessError) -> Self {
        match err {
            HarnessError::Config(e) => Self::Config(e.to_string()),
            HarnessError::Io(e) => Self::Io(e),
            other => Self::Command(other.to_string()),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
