//! Error types for the AT protocol.

use thiserror::Error;

/// Errors that can occur when working with the AT protocol.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AtError {
    /// Failed to parse a response or URC line.
    #[error("failed to parse response: {0}")]
    ParseError(String),

    /// Invalid command format.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// A capture pattern failed to compile.
    #[error("invalid capture pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        reason: String,
    },

    /// Hex payload could not be decoded.
    #[error("invalid hex payload: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Result type alias for AT protocol operations.
pub type AtResult<T> = Result<T, AtError>;
