//! Runner error type.

use nbiot_modem::ModemError;
use thiserror::Error;

/// Errors that can occur while running a CLI command.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error(transparent)]
    ModemError(#[from] ModemError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("modem rejected {0}")]
    Rejected(String),

    #[error("transfer failed: {0}")]
    TransferError(String),
}

/// Result type alias for runner operations.
pub type RunnerResult<T> = Result<T, RunnerError>;
