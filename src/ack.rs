//! Acknowledge, trim and delete processed entries.

use tracing::{debug, error};

use crate::broker::Broker;
use crate::commands::streams::AckReport;
use crate::entry::{DeliveredMessage, EntryId, Retention};
use crate::error::Result;
use crate::key::{GroupId, StreamKey};

/// Default approximate length a stream is trimmed to on acknowledge.
pub const DEFAULT_TRIM_LEN: usize = 1_000;

/// Closes the loop on processed messages.
///
/// An acknowledged entry is removed from the group's pending list, the
/// stream is trimmed, and the entry itself is deleted, all in one
/// `MULTI`/`EXEC` round trip. That batch is not atomic across a broker
/// failure: an entry may end up acknowledged but not yet deleted.
/// Acknowledging again is harmless and reports zero counts.
#[derive(Clone)]
pub struct Acknowledger<B> {
    broker: B,
    retention: Retention,
}

impl<B: Broker> Acknowledger<B> {
    /// Create an acknowledger that trims to `retention`.
    pub fn new(broker: B, retention: Retention) -> Self {
        Self { broker, retention }
    }

    /// Acknowledge entry `id` of `stream` for `group`.
    ///
    /// Failures are logged and returned; nothing is retried.
    pub async fn acknowledge(
        &self,
        stream: &StreamKey,
        group: &GroupId,
        id: EntryId,
    ) -> Result<AckReport> {
        match self
            .broker
            .ack_trim_delete(stream, group, id, self.retention)
            .await
        {
            Ok(report) => {
                debug!(
                    stream = %stream,
                    group = %group,
                    id = %id,
                    acknowledged = report.acknowledged,
                    trimmed = report.trimmed,
                    deleted = report.deleted,
                    "acknowledged entry"
                );
                Ok(report)
            }
            Err(e) => {
                error!(
                    stream = %stream,
                    group = %group,
                    id = %id,
                    error = %e,
                    "acknowledge failed"
                );
                Err(e)
            }
        }
    }

    /// Acknowledge a message handed out by a reader.
    pub async fn acknowledge_message(&self, message: &DeliveredMessage) -> Result<AckReport> {
        self.acknowledge(&message.stream, &message.group, message.id)
            .await
    }

    /// The retention bound applied on acknowledge.
    pub fn retention(&self) -> Retention {
        self.retention
    }
}
