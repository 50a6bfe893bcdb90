//! Pipeline error types.

use armature_resp::{RespError, ServerError};
use thiserror::Error;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Pipeline errors.
///
/// Cloneable because a single connection-scope error settles many commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Admission rejected: pending plus in-flight commands reached the bound.
    #[error("The queue is full")]
    QueueFull,

    /// The command was cancelled before it reached the wire.
    #[error("The command was aborted")]
    Aborted,

    /// The server answered this command with an error reply.
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// The connection dropped; the command's outcome is unknown.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The pipeline is shutting down for good.
    #[error("Pipeline shut down: {0}")]
    Shutdown(String),

    /// A reply arrived with nothing in flight. Correlation can no longer be trusted.
    #[error("Got an unexpected reply: wire and queue are out of sync")]
    Desync,

    /// Reply bytes or reply shape could not be decoded.
    #[error("Decode error: {0}")]
    Decode(#[from] RespError),

    /// The queue was dropped before the command was settled.
    #[error("The queue was closed")]
    QueueClosed,
}

impl PipelineError {
    /// Create a connection-lost error.
    pub fn connection_lost(reason: impl Into<String>) -> Self {
        Self::ConnectionLost(reason.into())
    }

    /// Create a shutdown error.
    pub fn shutdown(reason: impl Into<String>) -> Self {
        Self::Shutdown(reason.into())
    }

    /// Check if resending the command may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::QueueFull | Self::ConnectionLost(_))
    }

    /// Check if this error indicates connection loss.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::ConnectionLost(_) | Self::Desync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::connection_lost("socket closed");
        assert_eq!(format!("{}", err), "Connection lost: socket closed");

        let err = PipelineError::from(ServerError::new("ERR unknown command"));
        assert!(err.to_string().contains("ERR unknown command"));
    }

    #[test]
    fn test_error_classification() {
        assert!(PipelineError::QueueFull.is_retryable());
        assert!(PipelineError::connection_lost("x").is_retryable());
        assert!(!PipelineError::Aborted.is_retryable());
        assert!(!PipelineError::Server(ServerError::new("ERR")).is_retryable());

        assert!(PipelineError::Desync.is_connection_error());
        assert!(!PipelineError::shutdown("bye").is_connection_error());
    }
}
