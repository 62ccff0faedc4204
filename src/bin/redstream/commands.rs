//! Subcommand implementations.

use colored::Colorize;
use tracing::info;

use redstream::{key, ConsumerId, DeliveredMessage, GroupId, Result, StreamClient, Streams};

/// Stream, group and consumer used by `demo`.
const DEMO_STREAM: &str = "testing";
const DEMO_GROUP: &str = "FOLLOW_TESTING";
const DEMO_CONSUMER: &str = "TESTING";
const DEMO_PAYLOAD: &str = r#"{"name":"John", "age":30, "car":null}"#;

pub async fn publish(streams: &Streams<StreamClient>, stream: &str, payload: &str) -> Result<()> {
    let id = streams.publish(&key(stream), payload).await?;
    println!("{}", id);
    Ok(())
}

pub async fn subscribe(
    streams: &Streams<StreamClient>,
    stream: &str,
    group: &str,
    consumer: Option<String>,
    ack: bool,
) -> Result<()> {
    let consumer = consumer.map_or_else(ConsumerId::ephemeral, ConsumerId::new);
    let group = GroupId::new(group);
    let mut sub = streams.subscribe(&key(stream), group, consumer);

    loop {
        tokio::select! {
            message = sub.recv() => {
                let Some(message) = message else {
                    // The reader ended on its own; finish() reports why.
                    break;
                };
                print_message(&message);
                if ack {
                    streams.acknowledge_message(&message).await?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                return sub.stop().await.map(|_| ());
            }
        }
    }
    sub.finish().await.map(|_| ())
}

/// Publish a JSON document, then consume the group until that entry comes
/// back, acknowledging everything read on the way.
pub async fn demo(streams: &Streams<StreamClient>) -> Result<()> {
    let stream = key(DEMO_STREAM);
    let mut sub = streams
        .subscribe_ready(&stream, DEMO_GROUP, DEMO_CONSUMER)
        .await?;
    let published = streams.publish(&stream, DEMO_PAYLOAD).await?;
    println!("{} {}", "published".green(), published);

    loop {
        tokio::select! {
            message = sub.recv() => {
                let Some(message) = message else {
                    return sub.finish().await.map(|_| ());
                };
                print_message(&message);
                streams.acknowledge_message(&message).await?;
                if message.id == published {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }
    sub.stop().await.map(|_| ())
}

fn print_message(message: &DeliveredMessage) {
    let fields: Vec<String> = message
        .raw
        .iter()
        .map(|(k, v)| format!("{}={}", String::from_utf8_lossy(k), String::from_utf8_lossy(v)))
        .collect();
    println!(
        "{} {} {}",
        message.stream.to_string().cyan(),
        message.id.to_string().yellow(),
        fields.join(" ")
    );
}
