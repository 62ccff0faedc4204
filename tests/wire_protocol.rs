//! Commands as they go over the wire, checked against a scripted server.

mod common;

use std::time::Duration;

use common::*;
use redstream::{
    key, Broker, ConnectionConfig, ConsumerId, EntryId, Error, GroupId, GroupStart, ReadCursor,
    ReadGroupRequest, Retention, StreamClient, Streams,
};

fn strings(cmd: &[&str]) -> Vec<String> {
    cmd.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_connect_authenticates_then_pings() {
    let server = scripted_server(|cmd| handshake_reply(cmd).unwrap_or_default()).await;
    let mut config = server.config();
    config.password = Some("hunter2".into());
    config.database = 3;

    let client = StreamClient::connect(config).await.unwrap();
    assert_eq!(client.ping().await.unwrap(), "PONG");

    let received = server.received.lock().clone();
    assert_eq!(received[0], strings(&["AUTH", "hunter2"]));
    assert_eq!(received[1], strings(&["SELECT", "3"]));
    assert_eq!(received[2], strings(&["PING"]));
}

#[tokio::test]
async fn test_connect_fails_when_ping_fails() {
    let server = scripted_server(|cmd| match cmd[0].as_str() {
        "PING" => "-ERR server is loading\r\n".to_string(),
        _ => "+OK\r\n".to_string(),
    })
    .await;
    let err = StreamClient::connect(server.config()).await.err().unwrap();
    assert!(matches!(err, Error::Server(ref msg) if msg.contains("loading")));

    let server = scripted_server(|_| "+HELLO\r\n".to_string()).await;
    let err = StreamClient::connect(server.config()).await.err().unwrap();
    assert!(matches!(err, Error::UnexpectedResponse { expected: "PONG", .. }));
}

#[tokio::test]
async fn test_connect_rejected_password() {
    let server = scripted_server(|cmd| match cmd[0].as_str() {
        "AUTH" => "-WRONGPASS invalid username-password pair\r\n".to_string(),
        _ => handshake_reply(cmd).unwrap_or_default(),
    })
    .await;
    let mut config = server.config();
    config.password = Some("wrong".into());

    let err = StreamClient::connect(config).await.err().unwrap();
    assert!(matches!(err, Error::Auth(_)));
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_connect_refused_is_an_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = ConnectionConfig::from_addr("127.0.0.1", port);
    config.connect_timeout = Duration::from_secs(2);
    let err = StreamClient::connect(config).await.err().unwrap();
    assert!(matches!(err, Error::Io(_) | Error::Timeout(_)));
}

#[tokio::test]
async fn test_publish_sends_capped_xadd() {
    let server = scripted_server(|cmd| {
        handshake_reply(cmd).unwrap_or_else(|| bulk("1526919030474-0"))
    })
    .await;
    let client = StreamClient::connect(server.config()).await.unwrap();
    let streams = Streams::new(client, &test_config(GroupStart::Tail));

    let id = streams.publish(&key("orders"), "hi").await.unwrap();
    assert_eq!(id, EntryId::new(1526919030474, 0));
    assert_eq!(
        server.commands(),
        vec![strings(&[
            "XADD",
            "streams:orders",
            "MAXLEN",
            "~",
            "10000",
            "*",
            "payload",
            "hi"
        ])]
    );
}

#[tokio::test]
async fn test_acknowledge_is_one_transaction() {
    let server = scripted_server(|cmd| {
        handshake_reply(cmd).unwrap_or_else(|| match cmd[0].as_str() {
            "MULTI" => "+OK\r\n".to_string(),
            "EXEC" => "*3\r\n:1\r\n:0\r\n:1\r\n".to_string(),
            _ => "+QUEUED\r\n".to_string(),
        })
    })
    .await;
    let client = StreamClient::connect(server.config()).await.unwrap();
    let streams = Streams::new(client, &test_config(GroupStart::Tail));

    let report = streams
        .acknowledge(&key("testing"), &GroupId::new("FOLLOW_TESTING"), EntryId::new(5, 1))
        .await
        .unwrap();
    assert_eq!(report.acknowledged, 1);
    assert_eq!(report.trimmed, 0);
    assert_eq!(report.deleted, 1);

    assert_eq!(
        server.commands(),
        vec![
            strings(&["MULTI"]),
            strings(&["XACK", "streams:testing", "FOLLOW_TESTING", "5-1"]),
            strings(&["XTRIM", "streams:testing", "MAXLEN", "~", "1000"]),
            strings(&["XDEL", "streams:testing", "5-1"]),
            strings(&["EXEC"]),
        ]
    );
}

#[tokio::test]
async fn test_queued_error_fails_acknowledge() {
    let server = scripted_server(|cmd| {
        handshake_reply(cmd).unwrap_or_else(|| match cmd[0].as_str() {
            "MULTI" => "+OK\r\n".to_string(),
            "EXEC" => "-EXECABORT Transaction discarded because of previous errors.\r\n".to_string(),
            "XACK" => "-WRONGTYPE Operation against a key holding the wrong kind of value\r\n"
                .to_string(),
            _ => "+QUEUED\r\n".to_string(),
        })
    })
    .await;
    let client = StreamClient::connect(server.config()).await.unwrap();
    let streams = Streams::new(client, &test_config(GroupStart::Tail));

    let err = streams
        .acknowledge(&key("t"), &GroupId::new("g"), EntryId::new(1, 0))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn test_group_create_and_reads() {
    let server = scripted_server(|cmd| {
        handshake_reply(cmd).unwrap_or_else(|| match (cmd[0].as_str(), cmd.last()) {
            ("XGROUP", _) => "-BUSYGROUP Consumer Group name already exists\r\n".to_string(),
            ("XREADGROUP", Some(cursor)) if cursor == ">" => "*-1\r\n".to_string(),
            ("XREADGROUP", _) => format!(
                "*1\r\n*2\r\n{}*1\r\n*2\r\n{}*2\r\n{}{}",
                bulk("streams:orders"),
                bulk("7-0"),
                bulk("payload"),
                bulk("again"),
            ),
            _ => "-ERR unknown command\r\n".to_string(),
        })
    })
    .await;
    let client = StreamClient::connect(server.config()).await.unwrap();
    let (stream, group, consumer) = (key("orders"), GroupId::new("g"), ConsumerId::new("c"));

    let err = client
        .create_group(&stream, &group, GroupStart::Tail, true)
        .await
        .unwrap_err();
    assert!(err.is_busy_group());

    let mut request = ReadGroupRequest {
        stream: &stream,
        group: &group,
        consumer: &consumer,
        cursor: ReadCursor::Pending(EntryId::MIN),
        count: Some(10),
        block: Some(Duration::from_millis(2000)),
    };
    let batches = client.read_group(&request).await.unwrap();
    assert_eq!(batches[0].stream, stream);
    assert_eq!(batches[0].entries[0].id, EntryId::new(7, 0));

    request.cursor = ReadCursor::New;
    assert!(client.read_group(&request).await.unwrap().is_empty());

    assert_eq!(
        server.commands(),
        vec![
            strings(&["XGROUP", "CREATE", "streams:orders", "g", "$", "MKSTREAM"]),
            strings(&[
                "XREADGROUP",
                "GROUP",
                "g",
                "c",
                "COUNT",
                "10",
                "STREAMS",
                "streams:orders",
                "0-0"
            ]),
            strings(&[
                "XREADGROUP",
                "GROUP",
                "g",
                "c",
                "COUNT",
                "10",
                "BLOCK",
                "2000",
                "STREAMS",
                "streams:orders",
                ">"
            ]),
        ]
    );
}

#[tokio::test]
async fn test_server_error_keeps_connection_pooled() {
    let server = scripted_server(|cmd| {
        handshake_reply(cmd).unwrap_or_else(|| {
            "-WRONGTYPE Operation against a key holding the wrong kind of value\r\n".to_string()
        })
    })
    .await;
    let client = StreamClient::connect(server.config()).await.unwrap();
    assert_eq!(client.idle_connections(), 1);

    let err = client
        .append(&key("x"), &[], Retention::approximate(10))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(client.idle_connections(), 1);
}
