//! Runtime error types.

use thiserror::Error;

use crate::server_error::ServerError as DriverError;

/// Errors that can occur in the server runtime.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Configuration error (invalid bind address, bad limits).
    ///
    /// Fatal at startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (handshake failure, I/O error).
    ///
    /// May be transient (network issues) or fatal (bind address in use).
    #[error("transport error: {0}")]
    Transport(String),

    /// Protocol error (frame could not be encoded).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Internal error (unexpected state, logic bug).
    #[error("internal error: {0}")]
    Internal(String),

    /// Driver error (from `ServerDriver` processing).
    #[error("driver error: {0}")]
    Driver(#[from] DriverError),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<electron_proto::ProtocolError> for ServerError {
    fn from(err: electron_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_is_wrapped() {
        let err: ServerError = DriverError::ConnectionNotFound(7).into();
        assert_eq!(err.to_string(), "driver error: connection not found: 7");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn io_error_is_transport() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use");
        assert!(matches!(ServerError::from(io), ServerError::Transport(_)));
    }
}
