//! Stream command builders (XADD, XGROUP CREATE, XREADGROUP, XACK, XTRIM, XDEL)
//! and reply decoding.

use std::time::Duration;

use bytes::Bytes;

use crate::commands::{arg, exec};
use crate::connection::Connection;
use crate::entry::{Entry, EntryId, GroupStart, ReadCursor, Retention, StreamBatch};
use crate::error::{Error, Result};
use crate::key::{ConsumerId, GroupId, StreamKey};
use crate::types::Value;

/// Parameters of one `XREADGROUP` call against a single stream.
#[derive(Debug, Clone)]
pub struct ReadGroupRequest<'a> {
    /// Stream to read
    pub stream: &'a StreamKey,
    /// Consumer group
    pub group: &'a GroupId,
    /// Consumer within the group
    pub consumer: &'a ConsumerId,
    /// Pending replay or new entries
    pub cursor: ReadCursor,
    /// Maximum entries per call
    pub count: Option<usize>,
    /// How long a `>` read may wait for new entries. Ignored for pending reads.
    pub block: Option<Duration>,
}

/// Per-command counts from an acknowledge transaction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AckReport {
    /// Entries removed from the pending list (`XACK`)
    pub acknowledged: i64,
    /// Entries evicted by the retention trim (`XTRIM`)
    pub trimmed: i64,
    /// Entries deleted from the stream (`XDEL`)
    pub deleted: i64,
}

fn maxlen_args(args: &mut Vec<Bytes>, retention: Retention) {
    args.push(Bytes::from("MAXLEN"));
    if retention.approximate {
        args.push(Bytes::from("~"));
    }
    args.push(arg(retention.max_len));
}

/// `XADD key MAXLEN [~] n * field value [field value ...]`
pub fn xadd_args(
    stream: &StreamKey,
    fields: &[(Bytes, Bytes)],
    retention: Retention,
) -> Vec<Bytes> {
    let mut args = vec![Bytes::from("XADD"), arg(stream)];
    maxlen_args(&mut args, retention);
    args.push(Bytes::from("*"));
    for (field, value) in fields {
        args.push(field.clone());
        args.push(value.clone());
    }
    args
}

/// `XGROUP CREATE key group <$|0> [MKSTREAM]`
pub fn xgroup_create_args(
    stream: &StreamKey,
    group: &GroupId,
    start: GroupStart,
    mkstream: bool,
) -> Vec<Bytes> {
    let mut args = vec![
        Bytes::from("XGROUP"),
        Bytes::from("CREATE"),
        arg(stream),
        arg(group),
        Bytes::from(start.as_arg()),
    ];
    if mkstream {
        args.push(Bytes::from("MKSTREAM"));
    }
    args
}

/// `XREADGROUP GROUP group consumer [COUNT n] [BLOCK ms] STREAMS key id`
pub fn xreadgroup_args(req: &ReadGroupRequest<'_>) -> Vec<Bytes> {
    let mut args = vec![
        Bytes::from("XREADGROUP"),
        Bytes::from("GROUP"),
        arg(req.group),
        arg(req.consumer),
    ];
    if let Some(count) = req.count {
        args.push(Bytes::from("COUNT"));
        args.push(arg(count));
    }
    if let (ReadCursor::New, Some(block)) = (req.cursor, req.block) {
        args.push(Bytes::from("BLOCK"));
        args.push(arg(block.as_millis() as u64));
    }
    args.push(Bytes::from("STREAMS"));
    args.push(arg(req.stream));
    args.push(Bytes::from(req.cursor.to_string()));
    args
}

/// `XACK key group id`
pub fn xack_args(stream: &StreamKey, group: &GroupId, id: EntryId) -> Vec<Bytes> {
    vec![
        Bytes::from("XACK"),
        arg(stream),
        arg(group),
        Bytes::from(id.to_string()),
    ]
}

/// `XTRIM key MAXLEN [~] n`
pub fn xtrim_args(stream: &StreamKey, retention: Retention) -> Vec<Bytes> {
    let mut args = vec![Bytes::from("XTRIM"), arg(stream)];
    maxlen_args(&mut args, retention);
    args
}

/// `XDEL key id`
pub fn xdel_args(stream: &StreamKey, id: EntryId) -> Vec<Bytes> {
    vec![Bytes::from("XDEL"), arg(stream), Bytes::from(id.to_string())]
}

/// XADD: append an entry and return the ID the broker assigned.
pub async fn xadd(
    conn: &mut Connection,
    stream: &StreamKey,
    fields: &[(Bytes, Bytes)],
    retention: Retention,
) -> Result<EntryId> {
    exec(conn, xadd_args(stream, fields, retention))
        .await?
        .into_string()?
        .parse()
}

/// XGROUP CREATE: create a consumer group.
pub async fn xgroup_create(
    conn: &mut Connection,
    stream: &StreamKey,
    group: &GroupId,
    start: GroupStart,
    mkstream: bool,
) -> Result<()> {
    exec(conn, xgroup_create_args(stream, group, start, mkstream))
        .await?
        .expect_ok()
}

/// XREADGROUP: read through a consumer group.
pub async fn xreadgroup(
    conn: &mut Connection,
    req: &ReadGroupRequest<'_>,
) -> Result<Vec<StreamBatch>> {
    let reply = exec(conn, xreadgroup_args(req)).await?;
    parse_read_reply(reply)
}

/// XACK + XTRIM + XDEL inside one `MULTI`/`EXEC` round trip.
pub async fn ack_trim_delete(
    conn: &mut Connection,
    stream: &StreamKey,
    group: &GroupId,
    id: EntryId,
    retention: Retention,
) -> Result<AckReport> {
    let results = conn
        .transaction(&[
            xack_args(stream, group, id),
            xtrim_args(stream, retention),
            xdel_args(stream, id),
        ])
        .await?;
    parse_ack_report(results)
}

/// Decode the three `EXEC` results of an acknowledge transaction.
pub fn parse_ack_report(results: Vec<Value>) -> Result<AckReport> {
    let mut counts = results.into_iter().map(Value::into_integer);
    let mut next = || {
        counts
            .next()
            .unwrap_or_else(|| Err(Error::Protocol("short EXEC reply".into())))
    };
    Ok(AckReport {
        acknowledged: next()?,
        trimmed: next()?,
        deleted: next()?,
    })
}

/// Decode an `XREAD`/`XREADGROUP` reply.
///
/// ```text
/// [[key, [[id, [field, value, ...]], ...]], ...]
/// ```
///
/// A nil reply (timeout, or nothing to deliver) is an empty vector. A nil
/// field list marks a pending entry that was deleted from the stream.
pub fn parse_read_reply(reply: Value) -> Result<Vec<StreamBatch>> {
    reply
        .into_array()?
        .into_iter()
        .map(|stream| {
            let mut parts = stream.into_array()?.into_iter();
            let (Some(key), Some(entries)) = (parts.next(), parts.next()) else {
                return Err(Error::Protocol("stream reply needs key and entries".into()));
            };
            Ok(StreamBatch {
                stream: StreamKey::from_raw(key.into_string()?),
                entries: entries
                    .into_array()?
                    .into_iter()
                    .map(parse_entry)
                    .collect::<Result<_>>()?,
            })
        })
        .collect()
}

fn parse_entry(entry: Value) -> Result<Entry> {
    let mut parts = entry.into_array()?.into_iter();
    let (Some(id), Some(fields)) = (parts.next(), parts.next()) else {
        return Err(Error::Protocol("stream entry needs id and fields".into()));
    };

    let flat = fields.into_array()?;
    if flat.len() % 2 != 0 {
        return Err(Error::Protocol("odd number of field/value items".into()));
    }
    let mut pairs = Vec::with_capacity(flat.len() / 2);
    let mut items = flat.into_iter();
    while let (Some(field), Some(value)) = (items.next(), items.next()) {
        pairs.push((field.into_bytes()?, value.into_bytes()?));
    }

    Ok(Entry {
        id: id.into_string()?.parse()?,
        fields: pairs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::key;

    fn strings(args: &[Bytes]) -> Vec<&str> {
        args.iter()
            .map(|a| std::str::from_utf8(a).unwrap())
            .collect()
    }

    #[test]
    fn test_xadd_args() {
        let args = xadd_args(
            &key("testing"),
            &[(Bytes::from("payload"), Bytes::from("{}"))],
            Retention::approximate(10_000),
        );
        assert_eq!(
            strings(&args),
            ["XADD", "streams:testing", "MAXLEN", "~", "10000", "*", "payload", "{}"]
        );
    }

    #[test]
    fn test_exact_trim_args() {
        let retention = Retention {
            max_len: 1000,
            approximate: false,
        };
        assert_eq!(
            strings(&xtrim_args(&key("t"), retention)),
            ["XTRIM", "streams:t", "MAXLEN", "1000"]
        );
    }

    #[test]
    fn test_xreadgroup_args_block_only_for_new() {
        let stream = key("t");
        let group = GroupId::new("g");
        let consumer = ConsumerId::new("c");
        let mut req = ReadGroupRequest {
            stream: &stream,
            group: &group,
            consumer: &consumer,
            cursor: ReadCursor::Pending(EntryId::MIN),
            count: Some(10),
            block: Some(Duration::from_millis(2000)),
        };
        assert_eq!(
            strings(&xreadgroup_args(&req)),
            ["XREADGROUP", "GROUP", "g", "c", "COUNT", "10", "STREAMS", "streams:t", "0-0"]
        );

        req.cursor = ReadCursor::New;
        req.count = None;
        assert_eq!(
            strings(&xreadgroup_args(&req)),
            ["XREADGROUP", "GROUP", "g", "c", "BLOCK", "2000", "STREAMS", "streams:t", ">"]
        );
    }

    #[test]
    fn test_xgroup_create_args() {
        let args = xgroup_create_args(&key("t"), &GroupId::new("g"), GroupStart::Tail, true);
        assert_eq!(
            strings(&args),
            ["XGROUP", "CREATE", "streams:t", "g", "$", "MKSTREAM"]
        );
    }

    #[test]
    fn test_parse_read_reply() {
        let reply = Value::Array(vec![Value::Array(vec![
            Value::String(Bytes::from("streams:t")),
            Value::Array(vec![
                Value::Array(vec![
                    Value::String(Bytes::from("1-0")),
                    Value::Array(vec![
                        Value::String(Bytes::from("payload")),
                        Value::String(Bytes::from("a")),
                    ]),
                ]),
                Value::Array(vec![Value::String(Bytes::from("2-0")), Value::Nil]),
            ]),
        ])]);

        let batches = parse_read_reply(reply).unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].stream, key("t"));
        assert_eq!(batches[0].entries[0].id, EntryId::new(1, 0));
        assert_eq!(
            batches[0].entries[0].fields,
            vec![(Bytes::from("payload"), Bytes::from("a"))]
        );
        assert!(batches[0].entries[1].fields.is_empty());
    }

    #[test]
    fn test_parse_read_reply_nil_is_empty() {
        assert!(parse_read_reply(Value::Nil).unwrap().is_empty());
    }

    #[test]
    fn test_parse_read_reply_rejects_odd_fields() {
        let reply = Value::Array(vec![Value::Array(vec![
            Value::String(Bytes::from("streams:t")),
            Value::Array(vec![Value::Array(vec![
                Value::String(Bytes::from("1-0")),
                Value::Array(vec![Value::String(Bytes::from("payload"))]),
            ])]),
        ])]);
        assert!(matches!(parse_read_reply(reply), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_parse_ack_report() {
        let report = parse_ack_report(vec![
            Value::Integer(1),
            Value::Integer(0),
            Value::Integer(1),
        ])
        .unwrap();
        assert_eq!(
            report,
            AckReport {
                acknowledged: 1,
                trimmed: 0,
                deleted: 1
            }
        );

        let err = parse_ack_report(vec![
            Value::Integer(1),
            Value::Error("WRONGTYPE nope".into()),
            Value::Integer(0),
        ])
        .unwrap_err();
        assert!(err.is_fatal());

        assert!(parse_ack_report(vec![Value::Integer(1)]).is_err());
    }
}
