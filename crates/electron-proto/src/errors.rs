//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire messages.
///
/// None of these are fatal to a connection: the runtime logs them and drops
/// the offending frame.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame exceeds [`crate::MAX_MESSAGE_SIZE`]
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Received size in bytes
        size: usize,
        /// Maximum accepted size
        max: usize,
    },

    /// Frame is not a valid event envelope
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Frame type is not carried by this protocol (binary, etc.)
    #[error("unsupported frame: {0}")]
    UnsupportedFrame(&'static str),
}
