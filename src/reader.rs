//! Consumer group reader
//!
//! A reader walks through three states:
//!
//! ```text
//! GroupEnsure ──► Backlog(0-0) ──► Backlog(last id) ──► ... ──► Live
//!      ▲                                                          │
//!      └──────────────────────── NOGROUP ◄────────────────────────┘
//! ```
//!
//! Backlog replays this consumer's own pending entries, which is how an
//! entry delivered before a crash is handed out again. Once a backlog read
//! comes back empty the reader switches to `>` and follows the stream tail.
//! It never goes back to Backlog, so entries left pending by *other*
//! consumers of the group are not picked up by this reader.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::commands::streams::ReadGroupRequest;
use crate::entry::{DeliveredMessage, EntryId, GroupStart, ReadCursor, StreamBatch};
use crate::error::{Error, Result};
use crate::key::{ConsumerId, GroupId, StreamKey};
use crate::retry::RetryPolicy;

/// Consumer side settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// How long one live read may block on the broker, in milliseconds.
    /// Shutdown is only observed between reads, so keep this short.
    pub block_ms: u64,
    /// Maximum entries per read (`COUNT`); unbounded when unset
    pub batch_size: Option<usize>,
    /// Where a group created by the reader starts
    pub group_start: GroupStart,
    /// Create the stream along with the group (`MKSTREAM`)
    pub create_stream: bool,
    /// Capacity of the channel between the reader and the application
    pub channel_capacity: usize,
    /// Backoff after read failures
    pub retry: RetryPolicy,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            block_ms: 2_000,
            batch_size: None,
            group_start: GroupStart::Tail,
            create_stream: true,
            channel_capacity: 64,
            retry: RetryPolicy::default(),
        }
    }
}

impl ReaderConfig {
    /// The live read `BLOCK` timeout.
    pub fn block(&self) -> Duration {
        Duration::from_millis(self.block_ms)
    }
}

/// Where the reader is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Creating the consumer group
    GroupEnsure,
    /// Replaying own pending entries after the given ID
    Backlog(EntryId),
    /// Following new entries
    Live,
}

/// Why a reader stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// A shutdown signal was received, or its sender went away
    Cancelled,
    /// The receiving side of the output channel was dropped
    OutputClosed,
}

/// Reads one stream through one consumer of a consumer group.
pub struct GroupReader<B> {
    broker: B,
    stream: StreamKey,
    group: GroupId,
    consumer: ConsumerId,
    config: ReaderConfig,
    state: ReaderState,
}

impl<B: Broker> GroupReader<B> {
    /// Create a reader in the `GroupEnsure` state.
    pub fn new(
        broker: B,
        stream: StreamKey,
        group: GroupId,
        consumer: ConsumerId,
        config: ReaderConfig,
    ) -> Self {
        Self {
            broker,
            stream,
            group,
            consumer,
            config,
            state: ReaderState::GroupEnsure,
        }
    }

    /// Current state.
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// The consumer this reader reads as.
    pub fn consumer(&self) -> &ConsumerId {
        &self.consumer
    }

    /// Perform one transition and return the messages it delivered.
    ///
    /// A `NOGROUP` failure moves the reader back to `GroupEnsure`; any other
    /// failure leaves the state untouched so the same read is retried.
    pub async fn step(&mut self) -> Result<Vec<DeliveredMessage>> {
        match self.state {
            ReaderState::GroupEnsure => {
                self.ensure_group().await;
                self.state = ReaderState::Backlog(EntryId::MIN);
                Ok(Vec::new())
            }
            ReaderState::Backlog(cursor) => {
                let messages = self.read(ReadCursor::Pending(cursor)).await?;
                match messages.last() {
                    Some(last) => self.state = ReaderState::Backlog(last.id),
                    None => {
                        info!(
                            stream = %self.stream,
                            group = %self.group,
                            consumer = %self.consumer,
                            "backlog drained, following new entries"
                        );
                        self.state = ReaderState::Live;
                    }
                }
                Ok(messages)
            }
            ReaderState::Live => self.read(ReadCursor::New).await,
        }
    }

    /// Run until cancelled, until `out` is dropped, or until a terminal error.
    ///
    /// Shutdown is checked before every read, while waiting out a backoff
    /// and while waiting for room in `out`. A read already in flight is
    /// allowed to finish.
    pub async fn run(
        mut self,
        out: mpsc::Sender<DeliveredMessage>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<ReaderExit> {
        info!(
            stream = %self.stream,
            group = %self.group,
            consumer = %self.consumer,
            "Consumer {} starting",
            self.consumer
        );

        let mut failures: u32 = 0;
        loop {
            match shutdown.try_recv() {
                Err(broadcast::error::TryRecvError::Empty) => {}
                _ => return Ok(self.cancelled()),
            }
            if out.is_closed() {
                debug!(consumer = %self.consumer, "output closed, reader exiting");
                return Ok(ReaderExit::OutputClosed);
            }

            match self.step().await {
                Ok(messages) => {
                    failures = 0;
                    for message in messages {
                        debug!(stream = %message.stream, id = %message.id, "delivering entry");
                        tokio::select! {
                            sent = out.send(message) => {
                                if sent.is_err() {
                                    debug!(
                                        consumer = %self.consumer,
                                        "output closed, reader exiting"
                                    );
                                    return Ok(ReaderExit::OutputClosed);
                                }
                            }
                            _ = shutdown.recv() => return Ok(self.cancelled()),
                        }
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!(
                        stream = %self.stream,
                        group = %self.group,
                        error = %e,
                        "read failed, reader stopping"
                    );
                    return Err(e);
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    let Some(delay) = self.config.retry.next_delay(failures) else {
                        error!(
                            stream = %self.stream,
                            group = %self.group,
                            failures,
                            error = %e,
                            "read keeps failing, reader stopping"
                        );
                        return Err(Error::RetriesExhausted {
                            attempts: failures,
                            last: Box::new(e),
                        });
                    };
                    warn!(
                        stream = %self.stream,
                        group = %self.group,
                        failures,
                        retry_in = ?delay,
                        error = %e,
                        "read failed"
                    );
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = shutdown.recv() => return Ok(self.cancelled()),
                        }
                    }
                }
            }
        }
    }

    async fn ensure_group(&self) {
        let result = self
            .broker
            .create_group(
                &self.stream,
                &self.group,
                self.config.group_start,
                self.config.create_stream,
            )
            .await;
        match result {
            Ok(()) => info!(stream = %self.stream, group = %self.group, "created consumer group"),
            Err(e) if e.is_busy_group() => {
                debug!(stream = %self.stream, group = %self.group, "consumer group already exists")
            }
            Err(e) => warn!(
                stream = %self.stream,
                group = %self.group,
                error = %e,
                "could not create consumer group"
            ),
        }
    }

    async fn read(&mut self, cursor: ReadCursor) -> Result<Vec<DeliveredMessage>> {
        let request = ReadGroupRequest {
            stream: &self.stream,
            group: &self.group,
            consumer: &self.consumer,
            cursor,
            count: self.config.batch_size,
            block: Some(self.config.block()),
        };
        match self.broker.read_group(&request).await {
            Ok(batches) => Ok(self.wrap(batches)),
            Err(e) => {
                if e.is_no_group() {
                    warn!(stream = %self.stream, group = %self.group, "consumer group vanished");
                    self.state = ReaderState::GroupEnsure;
                }
                Err(e)
            }
        }
    }

    fn wrap(&self, batches: Vec<StreamBatch>) -> Vec<DeliveredMessage> {
        batches
            .into_iter()
            .flat_map(|batch| {
                let stream = batch.stream;
                let group = self.group.clone();
                batch
                    .entries
                    .into_iter()
                    .map(move |entry| DeliveredMessage::new(stream.clone(), group.clone(), entry))
            })
            .collect()
    }

    fn cancelled(&self) -> ReaderExit {
        info!(consumer = %self.consumer, "Consumer {} stopping", self.consumer);
        ReaderExit::Cancelled
    }
}

/// A running reader and the receiving end of its messages.
///
/// Dropping a subscription stops the reader at its next check.
pub struct Subscription {
    messages: mpsc::Receiver<DeliveredMessage>,
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<Result<ReaderExit>>,
}

impl Subscription {
    /// Spawn `reader` on the current runtime.
    pub fn spawn<B>(reader: GroupReader<B>, capacity: usize) -> Self
    where
        B: Broker + 'static,
    {
        let (tx, messages) = mpsc::channel(capacity.max(1));
        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let handle = tokio::spawn(reader.run(tx, shutdown_rx));
        Self {
            messages,
            shutdown,
            handle,
        }
    }

    /// Next delivered message; `None` once the reader has exited.
    pub async fn recv(&mut self) -> Option<DeliveredMessage> {
        self.messages.recv().await
    }

    /// Whether the reader task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signal the reader to stop and wait for it.
    ///
    /// Returns the terminal error if the reader had already failed.
    pub async fn stop(self) -> Result<ReaderExit> {
        let _ = self.shutdown.send(());
        Self::join(self.handle).await
    }

    /// Close the message channel and wait for the reader to exit.
    pub async fn finish(self) -> Result<ReaderExit> {
        let Subscription {
            messages,
            shutdown,
            handle,
        } = self;
        drop(messages);
        let result = Self::join(handle).await;
        drop(shutdown);
        result
    }

    async fn join(handle: JoinHandle<Result<ReaderExit>>) -> Result<ReaderExit> {
        handle.await.map_err(|e| Error::Task(e.to_string()))?
    }
}
