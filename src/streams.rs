//! One handle for publishing, subscribing and acknowledging.

use bytes::Bytes;

use crate::ack::Acknowledger;
use crate::broker::Broker;
use crate::client::StreamClient;
use crate::commands::streams::AckReport;
use crate::config::Config;
use crate::entry::{DeliveredMessage, EntryId};
use crate::error::Result;
use crate::key::{ConsumerId, GroupId, StreamKey};
use crate::producer::Producer;
use crate::reader::{GroupReader, ReaderConfig, Subscription};

/// Producer, reader factory and acknowledger over one broker.
///
/// # Examples
///
/// ```ignore
/// use redstream::{key, Config, Streams};
///
/// let streams = Streams::connect(&Config::load(None)?).await?;
/// let stream = key("testing");
/// streams.publish(&stream, r#"{"name":"John"}"#).await?;
///
/// let mut sub = streams.subscribe(&stream, "FOLLOW_TESTING", "TESTING");
/// while let Some(msg) = sub.recv().await {
///     streams.acknowledge(&msg.stream, &msg.group, msg.id).await?;
/// }
/// ```
#[derive(Clone)]
pub struct Streams<B> {
    broker: B,
    producer: Producer<B>,
    acknowledger: Acknowledger<B>,
    reader: ReaderConfig,
}

impl Streams<StreamClient> {
    /// Connect to the broker named by `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let client = StreamClient::connect(config.connection_config()?).await?;
        Ok(Self::new(client, config))
    }
}

impl<B: Broker + Clone + 'static> Streams<B> {
    /// Wrap an existing broker.
    pub fn new(broker: B, config: &Config) -> Self {
        Self {
            producer: Producer::new(broker.clone(), config.producer.retention()),
            acknowledger: Acknowledger::new(broker.clone(), config.acknowledge.retention()),
            reader: config.consumer.clone(),
            broker,
        }
    }

    /// The underlying broker.
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Append `payload` to `stream`.
    pub async fn publish(&self, stream: &StreamKey, payload: &str) -> Result<EntryId> {
        self.producer.publish(stream, payload).await
    }

    /// Append an entry with arbitrary fields to `stream`.
    pub async fn publish_fields(
        &self,
        stream: &StreamKey,
        fields: &[(Bytes, Bytes)],
    ) -> Result<EntryId> {
        self.producer.publish_fields(stream, fields).await
    }

    /// A reader for `stream` as `consumer` of `group`, not yet started.
    pub fn reader(
        &self,
        stream: &StreamKey,
        group: impl Into<GroupId>,
        consumer: impl Into<ConsumerId>,
    ) -> GroupReader<B> {
        GroupReader::new(
            self.broker.clone(),
            stream.clone(),
            group.into(),
            consumer.into(),
            self.reader.clone(),
        )
    }

    /// Start reading `stream` as `consumer` of `group` on a background task.
    ///
    /// The group is created if missing. Must be called within a tokio runtime.
    pub fn subscribe(
        &self,
        stream: &StreamKey,
        group: impl Into<GroupId>,
        consumer: impl Into<ConsumerId>,
    ) -> Subscription {
        Subscription::spawn(
            self.reader(stream, group, consumer),
            self.reader.channel_capacity,
        )
    }

    /// Like [`subscribe`](Self::subscribe), but create the group before
    /// returning, so entries published afterwards reach a tail-started group.
    pub async fn subscribe_ready(
        &self,
        stream: &StreamKey,
        group: impl Into<GroupId>,
        consumer: impl Into<ConsumerId>,
    ) -> Result<Subscription> {
        let mut reader = self.reader(stream, group, consumer);
        reader.step().await?;
        Ok(Subscription::spawn(reader, self.reader.channel_capacity))
    }

    /// Acknowledge, trim and delete entry `id`.
    pub async fn acknowledge(
        &self,
        stream: &StreamKey,
        group: &GroupId,
        id: EntryId,
    ) -> Result<AckReport> {
        self.acknowledger.acknowledge(stream, group, id).await
    }

    /// Acknowledge a delivered message.
    pub async fn acknowledge_message(&self, message: &DeliveredMessage) -> Result<AckReport> {
        self.acknowledger.acknowledge_message(message).await
    }
}
