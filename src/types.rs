//! Reply values and command argument conversion.

use bytes::Bytes;
use std::fmt;

use crate::error::{Error, Result};

/// A RESP2 reply from the broker.
///
/// Error replies are kept as values so that a reply nested inside an
/// `EXEC` array can be inspected without aborting the whole decode.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Simple string such as `+OK` or `+QUEUED`.
    Status(String),

    /// Error reply such as `-NOGROUP ...`.
    Error(String),

    /// Integer reply.
    Integer(i64),

    /// Bulk string.
    String(Bytes),

    /// Array of replies.
    Array(Vec<Value>),

    /// Null bulk string or null array.
    Nil,
}

impl Value {
    /// Returns the value as a string slice, if it is textual.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(b) => std::str::from_utf8(b).ok(),
            Value::Status(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns `true` if the value is nil.
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Turns a top-level error reply into `Err`.
    pub fn into_result(self) -> Result<Value> {
        match self {
            Value::Error(msg) => Err(Error::Server(msg)),
            other => Ok(other),
        }
    }

    /// Converts the value into an owned `String`.
    pub fn into_string(self) -> Result<String> {
        match self {
            Value::String(b) => String::from_utf8(b.to_vec())
                .map_err(|e| Error::Protocol(format!("invalid UTF-8 in string value: {}", e))),
            Value::Status(s) => Ok(s),
            Value::Error(msg) => Err(Error::Server(msg)),
            other => Err(other.unexpected("string")),
        }
    }

    /// Converts the value into raw bytes. Nil becomes an empty buffer.
    pub fn into_bytes(self) -> Result<Bytes> {
        match self {
            Value::String(b) => Ok(b),
            Value::Status(s) => Ok(Bytes::from(s)),
            Value::Nil => Ok(Bytes::new()),
            Value::Error(msg) => Err(Error::Server(msg)),
            other => Err(other.unexpected("string")),
        }
    }

    /// Converts the value into an `i64`.
    pub fn into_integer(self) -> Result<i64> {
        match self {
            Value::Integer(n) => Ok(n),
            Value::Error(msg) => Err(Error::Server(msg)),
            other => Err(other.unexpected("integer")),
        }
    }

    /// Converts the value into a `Vec<Value>`. Nil becomes an empty vector.
    pub fn into_array(self) -> Result<Vec<Value>> {
        match self {
            Value::Array(arr) => Ok(arr),
            Value::Nil => Ok(vec![]),
            Value::Error(msg) => Err(Error::Server(msg)),
            other => Err(other.unexpected("array")),
        }
    }

    /// Expects `+OK`.
    pub fn expect_ok(self) -> Result<()> {
        match self {
            Value::Status(ref s) if s == "OK" => Ok(()),
            Value::Error(msg) => Err(Error::Server(msg)),
            other => Err(other.unexpected("OK")),
        }
    }

    /// Returns a human-readable type name for this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Status(_) => "status",
            Value::Error(_) => "error",
            Value::Integer(_) => "integer",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Nil => "nil",
        }
    }

    fn unexpected(&self, expected: &'static str) -> Error {
        Error::UnexpectedResponse {
            expected,
            actual: self.type_name().to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Status(s) => write!(f, "{}", s),
            Value::Error(msg) => write!(f, "(error) {}", msg),
            Value::Integer(n) => write!(f, "(integer) {}", n),
            Value::String(b) => match std::str::from_utf8(b) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "<binary {} bytes>", b.len()),
            },
            Value::Array(arr) => {
                for (i, val) in arr.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}) {}", i + 1, val)?;
                }
                Ok(())
            }
            Value::Nil => write!(f, "(nil)"),
        }
    }
}

/// Types that can be sent as a command argument.
pub trait ToArg {
    /// Encode this value as a RESP bulk string argument.
    fn to_arg(&self) -> Bytes;
}

impl ToArg for &str {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for String {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }
}

impl ToArg for Bytes {
    fn to_arg(&self) -> Bytes {
        self.clone()
    }
}

impl ToArg for &[u8] {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self)
    }
}

impl ToArg for u64 {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl ToArg for usize {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}

impl ToArg for u8 {
    fn to_arg(&self) -> Bytes {
        Bytes::from(self.to_string())
    }
}
