//! RESP error types.

use std::fmt;
use thiserror::Error;

/// Result type for RESP operations.
pub type RespResult<T> = Result<T, RespError>;

/// Errors raised while decoding bytes or transforming replies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RespError {
    /// Malformed protocol data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Unknown RESP type byte.
    #[error("Unknown RESP type byte: 0x{0:02x}")]
    UnknownType(u8),

    /// A simple string or error line was not valid UTF-8.
    #[error("Invalid UTF-8 in reply line")]
    InvalidUtf8,

    /// Declared bulk string length exceeds the protocol limit.
    #[error("Bulk string of {0} bytes exceeds the protocol limit")]
    BulkTooLarge(i64),

    /// Arrays nested deeper than the decoder allows.
    #[error("Reply nesting exceeds {0} levels")]
    NestingTooDeep(usize),

    /// A reply did not have the shape a command expects.
    #[error("Unexpected reply: expected {expected}, got {got}")]
    UnexpectedReply {
        /// What the transformer expected
        expected: &'static str,
        /// What actually arrived
        got: String,
    },
}

impl RespError {
    /// Build an [`RespError::UnexpectedReply`] from the offending value.
    pub fn unexpected(expected: &'static str, got: impl fmt::Debug) -> Self {
        Self::UnexpectedReply {
            expected,
            got: format!("{:?}", got),
        }
    }
}

/// An error reply sent by the server (`-ERR ...`).
///
/// Belongs to exactly one command; it is a normal reply, not a connection failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ServerError {
    message: String,
}

impl ServerError {
    /// Create a server error from the raw reply line (without the `-` prefix).
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// The full error line.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The leading error code, e.g. `ERR` or `WRONGTYPE`.
    pub fn kind(&self) -> &str {
        self.message.split_whitespace().next().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_kind() {
        let err = ServerError::new("WRONGTYPE Operation against a key holding the wrong kind of value");
        assert_eq!(err.kind(), "WRONGTYPE");
        assert!(err.to_string().starts_with("WRONGTYPE Operation"));
    }

    #[test]
    fn test_server_error_empty_kind() {
        assert_eq!(ServerError::new("").kind(), "");
    }

    #[test]
    fn test_unexpected_reply_display() {
        let err = RespError::unexpected("integer", "OK");
        let display = format!("{}", err);
        assert!(display.contains("integer"));
        assert!(display.contains("\"OK\""));
    }
}
