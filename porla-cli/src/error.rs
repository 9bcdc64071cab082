//! CLI-specific error types and exit code mapping

use porla_core::error::PorlaError;
use porla_record::RecordError;

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Rotation schedule, date format or retention count rejected.
    #[error("{0}")]
    Validation(RecordError),

    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// The target file could not be opened or written.
    #[error("{0}")]
    Ingest(RecordError),

    /// Setup step failed (logging initialisation, signal handlers).
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Success                                   |
    /// | 1    | Validation / general error                |
    /// | 2    | Configuration error                       |
    /// | 10   | IO error (target file, stdout)            |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Ingest(_) | Self::Io(_) => 10,
            Self::Validation(_) | Self::Command(_) | Self::JsonSerialize(_) => 1,
        }
    }
}

impl From<RecordError> for CliError {
    fn from(e: RecordError) -> Self {
        if e.is_validation() {
            Self::Validation(e)
        } else {
            Self::Ingest(e)
        }
    }
}

impl From<PorlaError> for CliError {
    fn from(e: PorlaError) -> Self {
        match e {
            PorlaError::Config(e) => Self::Config(e.to_string()),
            PorlaError::Io(e) => Self::Io(e),
        }
    }
}
