//! Error types for the modem driver.

use nbiot_at::{AtError, CommandId};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while driving the modem.
#[derive(Debug, Error)]
pub enum ModemError {
    /// Transport I/O failure (link gone, write failed).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Opening the serial port failed.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A command was dispatched without a catalog entry.
    #[error("command {0} is not registered in the catalog")]
    UnregisteredCommand(CommandId),

    /// A request carried no command text.
    #[error("empty command text for {0}")]
    EmptyCommand(CommandId),

    /// No terminal line arrived before the response deadline.
    #[error("no response to `AT+{command}` within {elapsed:?}")]
    ResponseTimeout {
        /// Command body that timed out.
        command: String,
        /// Time waited.
        elapsed: Duration,
    },

    /// The modem did not attach before the ceiling.
    #[error("network attach timed out after {elapsed:?} ({polls} polls)")]
    AttachTimeout {
        /// Time waited.
        elapsed: Duration,
        /// Attachment status polls issued.
        polls: u32,
    },

    /// A connect step failed and the failure policy aborted the sequence.
    #[error("connect step `{step}` failed")]
    StepFailed {
        /// Name of the failed step.
        step: &'static str,
    },

    /// A socket operation was attempted with no socket bound.
    #[error("no socket is bound")]
    SocketUnbound,

    /// A captured value could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Protocol-level parse failure.
    #[error(transparent)]
    Protocol(#[from] AtError),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for modem operations.
pub type ModemResult<T> = Result<T, ModemError>;
