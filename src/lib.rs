//! # redstream: consumer groups over Redis Streams
//!
//! A small client for producing to and consuming from Redis Streams (or any
//! broker that speaks the same commands over RESP2).
//!
//! ## Features
//!
//! - **Producer**: `XADD` with a broker-assigned ID and an approximate `MAXLEN` cap
//! - **Consumer group reader**: replays this consumer's pending entries, then
//!   follows the stream tail; messages arrive over a bounded channel
//! - **At-least-once**: an entry stays pending until it is acknowledged
//! - **Acknowledger**: `XACK`, `XTRIM` and `XDEL` in one `MULTI`/`EXEC` round trip
//! - **Backoff**: configurable retry policy for failed reads
//! - **In-memory broker**: the same semantics without a server, with fault injection
//! - **TLS support**: optional, via the `tls` feature flag
//!
//! ## Quick Start
//!
//! ```ignore
//! use redstream::{key, Config, Streams};
//!
//! #[tokio::main]
//! async fn main() -> redstream::Result<()> {
//!     let config = Config::load(None)?;
//!     let streams = Streams::connect(&config).await?;
//!
//!     let stream = key("testing");
//!     streams.publish(&stream, "hello").await?;
//!
//!     let mut sub = streams.subscribe(&stream, "FOLLOW_TESTING", "TESTING");
//!     if let Some(msg) = sub.recv().await {
//!         println!("{} => {:?}", msg.id, msg.payload());
//!         streams.acknowledge_message(&msg).await?;
//!     }
//!     sub.stop().await?;
//!     Ok(())
//! }
//! ```

pub mod ack;
pub mod broker;
pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod entry;
pub mod error;
pub mod key;
pub mod memory;
pub mod pool;
pub mod producer;
pub mod reader;
pub mod resp;
pub mod retry;
pub mod streams;
pub mod telemetry;
pub mod types;

// ── Re-exports for ergonomic top-level usage ────────────────────────────────

pub use ack::Acknowledger;
pub use broker::Broker;
pub use client::StreamClient;
pub use commands::streams::{AckReport, ReadGroupRequest};
pub use config::Config;
pub use connection::ConnectionConfig;
pub use entry::{DeliveredMessage, Entry, EntryId, GroupStart, ReadCursor, Retention};
pub use error::{Error, Result};
pub use key::{key, ConsumerId, GroupId, StreamKey};
pub use memory::MemoryBroker;
pub use producer::Producer;
pub use reader::{GroupReader, ReaderConfig, ReaderExit, ReaderState, Subscription};
pub use retry::RetryPolicy;
pub use streams::Streams;
pub use types::{ToArg, Value};
