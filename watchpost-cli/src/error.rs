//! CLI-specific error types and exit code mapping

use watchpost_core::error::WatchpostError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// `scan` found something; the report has already been printed.
    #[error("{0} finding(s) detected")]
    Detected(usize),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (file read, stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from watchpost-core.
    #[error("{0}")]
    Core(#[from] WatchpostError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                     |
    /// |------|-----------------------------|
    /// | 0    | Success                     |
    /// | 1    | General / command error     |
    /// | 2    | Configuration error         |
    /// | 4    | Scan detected a threat      |
    /// | 10   | IO error                    |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::Core(WatchpostError::Config(_)) => 2,
            Self::Detected(_) => 4,
            Self::Io(_) | Self::Core(WatchpostError::Io(_)) => 10,
            Self::JsonSerialize(_) | Self::Command(_) | Self::Core(_) => 1,
        }
    }
}
