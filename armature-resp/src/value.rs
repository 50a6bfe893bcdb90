//! Decoded reply values.

use bytes::Bytes;

use crate::error::ServerError;

/// A fully decoded RESP2 reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `+OK`
    SimpleString(String),
    /// `:42`
    Integer(i64),
    /// `$5\r\nhello`
    BulkString(Bytes),
    /// `*N` followed by N values
    Array(Vec<Value>),
    /// `$-1` or `*-1`
    Nil,
    /// An error reply nested inside an array (top-level errors are decode events).
    Error(ServerError),
}

impl Value {
    /// Check for the null reply.
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Borrow textual content of a simple or UTF-8 bulk string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::SimpleString(s) => Some(s),
            Value::BulkString(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    /// Borrow raw bytes of a simple or bulk string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::SimpleString(s) => Some(s.as_bytes()),
            Value::BulkString(b) => Some(b),
            _ => None,
        }
    }

    /// Integer content.
    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Unwrap an array reply, or hand the value back.
    pub fn into_array(self) -> Result<Vec<Value>, Value> {
        match self {
            Value::Array(items) => Ok(items),
            other => Err(other),
        }
    }

    /// Short name of the reply kind, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::SimpleString(_) => "simple-string",
            Value::Integer(_) => "integer",
            Value::BulkString(_) => "bulk-string",
            Value::Array(_) => "array",
            Value::Nil => "nil",
            Value::Error(_) => "error",
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::BulkString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str() {
        assert_eq!(Value::SimpleString("OK".into()).as_str(), Some("OK"));
        assert_eq!(Value::from("v").as_str(), Some("v"));
        assert_eq!(Value::BulkString(Bytes::from_static(&[0xff])).as_str(), None);
        assert_eq!(Value::Integer(1).as_str(), None);
    }

    #[test]
    fn test_into_array() {
        let v = Value::Array(vec![Value::Integer(1), Value::Nil]);
        assert_eq!(v.into_array().unwrap().len(), 2);
        assert_eq!(Value::Nil.into_array(), Err(Value::Nil));
    }

    #[test]
    fn test_kind() {
        assert_eq!(Value::Nil.kind(), "nil");
        assert_eq!(Value::from(3_i64).kind(), "integer");
        assert!(Value::Nil.is_nil());
    }
}
