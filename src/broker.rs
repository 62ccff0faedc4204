//! The seam between the stream components and the broker that stores streams.
//!
//! [`StreamClient`](crate::StreamClient) implements it over RESP and
//! [`MemoryBroker`](crate::MemoryBroker) in process.

use async_trait::async_trait;
use bytes::Bytes;

use crate::commands::streams::{AckReport, ReadGroupRequest};
use crate::entry::{EntryId, GroupStart, Retention, StreamBatch};
use crate::error::Result;
use crate::key::{GroupId, StreamKey};

/// Stream operations the producer, reader and acknowledger need.
///
/// Implementations must be safe to call concurrently; the broker, not the
/// caller, serializes conflicting operations.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Append an entry with a broker-generated ID, trimming to `retention`.
    async fn append(
        &self,
        stream: &StreamKey,
        fields: &[(Bytes, Bytes)],
        retention: Retention,
    ) -> Result<EntryId>;

    /// Create a consumer group. Fails with `BUSYGROUP` if it already exists.
    async fn create_group(
        &self,
        stream: &StreamKey,
        group: &GroupId,
        start: GroupStart,
        mkstream: bool,
    ) -> Result<()>;

    /// Read through a consumer group.
    async fn read_group(&self, request: &ReadGroupRequest<'_>) -> Result<Vec<StreamBatch>>;

    /// Acknowledge, trim and delete one entry as a single batch.
    async fn ack_trim_delete(
        &self,
        stream: &StreamKey,
        group: &GroupId,
        id: EntryId,
        retention: Retention,
    ) -> Result<AckReport>;
}
