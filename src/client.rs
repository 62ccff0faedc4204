//! RESP client for a Redis-compatible broker.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::info;

use crate::broker::Broker;
use crate::commands::{self, streams::AckReport, streams::ReadGroupRequest};
use crate::connection::{Connection, ConnectionConfig};
use crate::entry::{EntryId, GroupStart, Retention, StreamBatch};
use crate::error::Result;
use crate::key::{GroupId, StreamKey};
use crate::pool::Pool;

/// A cheaply cloneable handle to one broker.
///
/// # Examples
///
/// ```ignore
/// use redstream::{ConnectionConfig, StreamClient};
///
/// let client = StreamClient::connect(ConnectionConfig::from_addr("127.0.0.1", 6379)).await?;
/// client.ping().await?;
/// ```
#[derive(Clone)]
pub struct StreamClient {
    pool: Arc<Pool>,
}

impl StreamClient {
    /// Connect to the broker.
    ///
    /// One connection is opened and verified with PING before this returns,
    /// so an unreachable or misconfigured broker is reported here rather
    /// than on first use.
    pub async fn connect(config: ConnectionConfig) -> Result<Self> {
        let conn = Connection::connect(&config).await?;
        info!(address = %config.address(), pool_size = config.pool_size, "connected to broker");
        Ok(Self {
            pool: Arc::new(Pool::with_connection(config, conn)),
        })
    }

    /// PING: returns the server's reply.
    pub async fn ping(&self) -> Result<String> {
        let mut conn = self.pool.get().await?;
        let result = commands::server::ping(conn.conn()).await;
        conn.settle(result)
    }

    /// Idle connections currently held by the handle.
    pub fn idle_connections(&self) -> usize {
        self.pool.idle_count()
    }
}

#[async_trait]
impl Broker for StreamClient {
    async fn append(
        &self,
        stream: &StreamKey,
        fields: &[(Bytes, Bytes)],
        retention: Retention,
    ) -> Result<EntryId> {
        let mut conn = self.pool.get().await?;
        let result = commands::streams::xadd(conn.conn(), stream, fields, retention).await;
        conn.settle(result)
    }

    async fn create_group(
        &self,
        stream: &StreamKey,
        group: &GroupId,
        start: GroupStart,
        mkstream: bool,
    ) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let result =
            commands::streams::xgroup_create(conn.conn(), stream, group, start, mkstream).await;
        conn.settle(result)
    }

    async fn read_group(&self, request: &ReadGroupRequest<'_>) -> Result<Vec<StreamBatch>> {
        let mut conn = self.pool.get().await?;
        let result = commands::streams::xreadgroup(conn.conn(), request).await;
        conn.settle(result)
    }

    async fn ack_trim_delete(
        &self,
        stream: &StreamKey,
        group: &GroupId,
        id: EntryId,
        retention: Retention,
    ) -> Result<AckReport> {
        let mut conn = self.pool.get().await?;
        let result =
            commands::streams::ack_trim_delete(conn.conn(), stream, group, id, retention).await;
        conn.settle(result)
    }
}
