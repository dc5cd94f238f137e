//! Driver error types.
//!
//! Errors here are protocol-level bookkeeping faults. Authorization failures
//! never surface as errors; they are silent drops or rejection events.

use thiserror::Error;

use crate::state::ConnectionId;

/// Errors that can occur while the driver processes an event.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Connection not found in the driver.
    ///
    /// A message arrived for a connection that was never accepted or has
    /// already closed. Transient if the close raced the read.
    #[error("connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// Connection already registered.
    ///
    /// The runtime handed out a duplicate connection ID. This is a logic bug
    /// in the runtime.
    #[error("connection already exists: {0}")]
    ConnectionAlreadyExists(ConnectionId),

    /// Message encoding/decoding error.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<electron_proto::ProtocolError> for ServerError {
    fn from(err: electron_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}
