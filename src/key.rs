//! Stream, group and consumer identifiers.

use std::fmt;

use bytes::Bytes;

use crate::types::ToArg;

/// Namespace prepended to every logical stream name.
pub const STREAM_NAMESPACE: &str = "streams:";

/// Namespaced stream identifier, e.g. `streams:orders`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamKey(String);

/// Map a logical name to its namespaced stream key.
///
/// ```
/// assert_eq!(redstream::key("testing").as_str(), "streams:testing");
/// ```
pub fn key(name: &str) -> StreamKey {
    StreamKey(format!("{}{}", STREAM_NAMESPACE, name))
}

impl StreamKey {
    /// Wrap a key exactly as the broker reported it, without adding the namespace.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The full key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The logical name, if the key carries the namespace.
    pub fn name(&self) -> Option<&str> {
        self.0.strip_prefix(STREAM_NAMESPACE)
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StreamKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl ToArg for &StreamKey {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.0.as_bytes())
    }
}

/// Consumer group name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupId(String);

impl GroupId {
    /// Create a group name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The group name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GroupId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl ToArg for &GroupId {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.0.as_bytes())
    }
}

/// Consumer name within a group. Pending entries are tracked per consumer,
/// so a restarted consumer must reuse its name to recover its backlog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerId(String);

impl ConsumerId {
    /// Create a consumer name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// A random, throwaway consumer name. Its backlog cannot be recovered
    /// after a restart.
    pub fn ephemeral() -> Self {
        Self(format!("consumer-{}", uuid::Uuid::new_v4()))
    }

    /// The consumer name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConsumerId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl ToArg for &ConsumerId {
    fn to_arg(&self) -> Bytes {
        Bytes::copy_from_slice(self.0.as_bytes())
    }
}
