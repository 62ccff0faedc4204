//! Stream entries, read cursors and delivered messages.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::Error;
use crate::key::{GroupId, StreamKey};

/// Name of the field producers write their payload into.
pub const PAYLOAD_FIELD: &str = "payload";

/// Broker-assigned entry ID (`<ms>-<seq>`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntryId {
    /// Milliseconds timestamp
    pub ms: u64,
    /// Sequence number within the millisecond
    pub seq: u64,
}

impl EntryId {
    /// `0-0`, smaller than any ID the broker assigns.
    pub const MIN: EntryId = EntryId { ms: 0, seq: 0 };

    /// Create an entry ID.
    pub const fn new(ms: u64, seq: u64) -> Self {
        Self { ms, seq }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

impl FromStr for EntryId {
    type Err = Error;

    /// Accepts `ms-seq` or a bare `ms` (sequence 0).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::Protocol(format!("invalid stream entry ID: {:?}", s));
        let (ms, seq) = match s.split_once('-') {
            Some((ms, seq)) => (ms, seq),
            None => (s, "0"),
        };
        Ok(Self {
            ms: ms.parse().map_err(|_| invalid())?,
            seq: seq.parse().map_err(|_| invalid())?,
        })
    }
}

/// Where a group read starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCursor {
    /// Replay this consumer's pending entries with IDs greater than the given one.
    Pending(EntryId),
    /// Only entries never delivered to the group (`>`).
    New,
}

impl fmt::Display for ReadCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadCursor::Pending(id) => write!(f, "{}", id),
            ReadCursor::New => f.write_str(">"),
        }
    }
}

/// Position a newly created consumer group starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStart {
    /// Current tail of the stream (`$`); only later entries are delivered.
    #[default]
    Tail,
    /// Beginning of the stream (`0`); every retained entry is delivered.
    Beginning,
}

impl GroupStart {
    /// The ID argument for `XGROUP CREATE`.
    pub fn as_arg(&self) -> &'static str {
        match self {
            GroupStart::Tail => "$",
            GroupStart::Beginning => "0",
        }
    }
}

/// Approximate length bound applied with `MAXLEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    /// Maximum number of entries to retain.
    pub max_len: usize,
    /// Let the broker trim lazily (`MAXLEN ~`) instead of exactly.
    pub approximate: bool,
}

impl Retention {
    /// An approximate bound of `max_len` entries.
    pub const fn approximate(max_len: usize) -> Self {
        Self {
            max_len,
            approximate: true,
        }
    }
}

/// An entry as read from the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The entry ID
    pub id: EntryId,
    /// Field-value pairs in broker order. Empty when the entry was deleted
    /// while still pending.
    pub fields: Vec<(Bytes, Bytes)>,
}

/// Entries read from one stream in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamBatch {
    /// The stream the entries belong to
    pub stream: StreamKey,
    /// Entries in ID order
    pub entries: Vec<Entry>,
}

/// A message handed to application code. It must be acknowledged once
/// processing succeeds, otherwise it stays pending and is redelivered.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveredMessage {
    /// Stream the entry was read from
    pub stream: StreamKey,
    /// Group the entry was delivered through
    pub group: GroupId,
    /// Entry ID, needed for acknowledgement
    pub id: EntryId,
    /// Raw field-value pairs
    pub raw: Vec<(Bytes, Bytes)>,
}

impl DeliveredMessage {
    pub(crate) fn new(stream: StreamKey, group: GroupId, entry: Entry) -> Self {
        Self {
            stream,
            group,
            id: entry.id,
            raw: entry.fields,
        }
    }

    /// Value of the named field as UTF-8, if present.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.raw
            .iter()
            .find(|(k, _)| k.as_ref() == name.as_bytes())
            .and_then(|(_, v)| std::str::from_utf8(v).ok())
    }

    /// The `payload` field.
    pub fn payload(&self) -> Option<&str> {
        self.field(PAYLOAD_FIELD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let id: EntryId = "1526919030474-55".parse().unwrap();
        assert_eq!(id, EntryId::new(1526919030474, 55));
        assert_eq!(id.to_string(), "1526919030474-55");
        assert_eq!("5".parse::<EntryId>().unwrap(), EntryId::new(5, 0));
        assert!("abc-1".parse::<EntryId>().is_err());
        assert!("".parse::<EntryId>().is_err());
    }

    #[test]
    fn test_ordering() {
        assert!(EntryId::new(1, 9) < EntryId::new(2, 0));
        assert!(EntryId::new(2, 0) < EntryId::new(2, 1));
        assert!(EntryId::MIN < EntryId::new(0, 1));
    }

    #[test]
    fn test_cursor_args() {
        assert_eq!(ReadCursor::Pending(EntryId::MIN).to_string(), "0-0");
        assert_eq!(ReadCursor::New.to_string(), ">");
        assert_eq!(GroupStart::Tail.as_arg(), "$");
    }

    #[test]
    fn test_message_fields() {
        let msg = DeliveredMessage::new(
            crate::key::key("t"),
            GroupId::new("g"),
            Entry {
                id: EntryId::new(1, 0),
                fields: vec![
                    (Bytes::from("payload"), Bytes::from("{}")),
                    (Bytes::from("source"), Bytes::from("api")),
                ],
            },
        );
        assert_eq!(msg.payload(), Some("{}"));
        assert_eq!(msg.field("source"), Some("api"));
        assert_eq!(msg.field("missing"), None);
    }
}
