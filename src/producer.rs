//! Appending payloads to a stream.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::broker::Broker;
use crate::entry::{EntryId, Retention, PAYLOAD_FIELD};
use crate::error::Result;
use crate::key::StreamKey;

/// Default approximate cap applied on every append.
pub const DEFAULT_MAX_LEN: usize = 10_000;

/// Appends entries to streams under a retention bound.
#[derive(Clone)]
pub struct Producer<B> {
    broker: B,
    retention: Retention,
}

impl<B: Broker> Producer<B> {
    /// Create a producer that trims to `retention` on every append.
    pub fn new(broker: B, retention: Retention) -> Self {
        Self { broker, retention }
    }

    /// Append `payload` as the `payload` field of a new entry.
    ///
    /// The broker assigns the ID. Errors are returned, never dropped.
    pub async fn publish(&self, stream: &StreamKey, payload: &str) -> Result<EntryId> {
        let fields = [(
            Bytes::from_static(PAYLOAD_FIELD.as_bytes()),
            Bytes::copy_from_slice(payload.as_bytes()),
        )];
        self.publish_fields(stream, &fields).await
    }

    /// Append an entry with arbitrary fields.
    pub async fn publish_fields(
        &self,
        stream: &StreamKey,
        fields: &[(Bytes, Bytes)],
    ) -> Result<EntryId> {
        match self.broker.append(stream, fields, self.retention).await {
            Ok(id) => {
                debug!(stream = %stream, id = %id, "published entry");
                Ok(id)
            }
            Err(e) => {
                warn!(stream = %stream, error = %e, "publish failed");
                Err(e)
            }
        }
    }

    /// The retention bound applied on append.
    pub fn retention(&self) -> Retention {
        self.retention
    }
}
