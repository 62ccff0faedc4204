//! Shared test utilities for redstream integration tests.
//!
//! Import via `mod common;` in integration test files:
//! ```rust,ignore
//! mod common;
//! use common::*;
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use redstream::{
    Config, ConnectionConfig, DeliveredMessage, GroupStart, MemoryBroker, RetryPolicy, Streams,
    Subscription, Value,
};

// ============================================================================
// In-memory helpers
// ============================================================================

/// Config tuned for tests: short blocking reads, immediate retries.
#[allow(dead_code)]
pub fn test_config(group_start: GroupStart) -> Config {
    let mut config = Config::default();
    config.connection.host = Some("127.0.0.1".to_string());
    config.connection.port = Some(6379);
    config.connection.require_password = false;
    config.consumer.block_ms = 25;
    config.consumer.group_start = group_start;
    config.consumer.retry = RetryPolicy::immediate();
    config
}

/// `Streams` over a fresh `MemoryBroker`, groups created at the start.
#[allow(dead_code)]
pub fn memory_streams() -> Streams<MemoryBroker> {
    Streams::new(MemoryBroker::new(), &test_config(GroupStart::Beginning))
}

/// Receive one message or fail after a second.
#[allow(dead_code)]
pub async fn recv(sub: &mut Subscription) -> DeliveredMessage {
    tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("reader exited")
}

/// Assert nothing arrives within `wait`.
#[allow(dead_code)]
pub async fn assert_quiet(sub: &mut Subscription, wait: Duration) {
    if let Ok(Some(msg)) = tokio::time::timeout(wait, sub.recv()).await {
        panic!("unexpected message {}", msg.id);
    }
}

// ============================================================================
// Scripted RESP server
// ============================================================================

/// A TCP server that records every command it receives and answers with
/// whatever the script returns.
#[allow(dead_code)]
pub struct ScriptedServer {
    pub port: u16,
    pub received: Arc<Mutex<Vec<Vec<String>>>>,
}

#[allow(dead_code)]
impl ScriptedServer {
    /// Connection settings pointing at this server.
    pub fn config(&self) -> ConnectionConfig {
        ConnectionConfig::from_addr("127.0.0.1", self.port)
    }

    /// Commands received so far, excluding the connect handshake.
    pub fn commands(&self) -> Vec<Vec<String>> {
        self.received
            .lock()
            .iter()
            .filter(|cmd| !matches!(cmd[0].as_str(), "PING" | "AUTH" | "SELECT"))
            .cloned()
            .collect()
    }
}

/// Start a scripted server on a random port.
#[allow(dead_code)]
pub async fn scripted_server<F>(script: F) -> ScriptedServer
where
    F: Fn(&[String]) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("should bind to random port");
    let port = listener.local_addr().expect("should have local addr").port();
    let received = Arc::new(Mutex::new(Vec::new()));
    let script = Arc::new(script);

    let log = received.clone();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let log = log.clone();
            let script = script.clone();
            tokio::spawn(async move {
                let mut buf = BytesMut::with_capacity(4096);
                loop {
                    while let Ok(Some(value)) = redstream::resp::decode_value(&mut buf) {
                        let cmd = command_strings(value);
                        log.lock().push(cmd.clone());
                        let reply = (*script)(&cmd);
                        if socket.write_all(reply.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                    match socket.read_buf(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => {}
                    }
                }
            });
        }
    });

    ScriptedServer { port, received }
}

/// Replies every Redis accepts for the connect handshake.
#[allow(dead_code)]
pub fn handshake_reply(cmd: &[String]) -> Option<String> {
    match cmd[0].as_str() {
        "PING" => Some("+PONG\r\n".to_string()),
        "AUTH" | "SELECT" => Some("+OK\r\n".to_string()),
        _ => None,
    }
}

/// RESP bulk string.
#[allow(dead_code)]
pub fn bulk(s: &str) -> String {
    format!("${}\r\n{}\r\n", s.len(), s)
}

fn command_strings(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(b) => String::from_utf8_lossy(&b).into_owned(),
                other => other.to_string(),
            })
            .collect(),
        other => vec![other.to_string()],
    }
}
