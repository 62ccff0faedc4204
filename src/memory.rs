//! In-process broker with Redis Streams semantics.
//!
//! Used to run producers, readers and acknowledgers without a server, and
//! to inject failures into them. Entry IDs, consumer groups, pending lists,
//! `>` versus explicit-ID reads, blocking reads and ack/trim/delete behave
//! like the real commands; trimming is always exact.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::broker::Broker;
use crate::commands::streams::{AckReport, ReadGroupRequest};
use crate::entry::{Entry, EntryId, GroupStart, ReadCursor, Retention, StreamBatch};
use crate::error::{Error, Result};
use crate::key::{ConsumerId, GroupId, StreamKey};

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";

/// A shareable in-memory broker. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    appended: Notify,
}

#[derive(Default)]
struct State {
    keys: HashMap<StreamKey, Slot>,
    failing_appends: u32,
    failing_reads: u32,
    failing_acks: u32,
    read_calls: u64,
}

enum Slot {
    Stream(MemStream),
    /// A key holding some other data type.
    Other,
}

#[derive(Default)]
struct MemStream {
    entries: BTreeMap<EntryId, Vec<(Bytes, Bytes)>>,
    last_id: EntryId,
    groups: HashMap<GroupId, MemGroup>,
}

struct MemGroup {
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingEntry>,
}

struct PendingEntry {
    consumer: ConsumerId,
    delivery_count: u64,
}

impl MemStream {
    fn next_id(&self) -> EntryId {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        if now > self.last_id.ms {
            EntryId::new(now, 0)
        } else {
            EntryId::new(self.last_id.ms, self.last_id.seq + 1)
        }
    }

    fn trim(&mut self, max_len: usize) -> usize {
        let mut removed = 0;
        while self.entries.len() > max_len {
            self.entries.pop_first();
            removed += 1;
        }
        removed
    }
}

impl State {
    fn stream(&self, key: &StreamKey) -> Result<Option<&MemStream>> {
        match self.keys.get(key) {
            Some(Slot::Stream(s)) => Ok(Some(s)),
            Some(Slot::Other) => Err(Error::Server(WRONGTYPE.into())),
            None => Ok(None),
        }
    }

    fn stream_mut(&mut self, key: &StreamKey) -> Result<Option<&mut MemStream>> {
        match self.keys.get_mut(key) {
            Some(Slot::Stream(s)) => Ok(Some(s)),
            Some(Slot::Other) => Err(Error::Server(WRONGTYPE.into())),
            None => Ok(None),
        }
    }

    fn read_now(&mut self, req: &ReadGroupRequest<'_>) -> Result<Vec<StreamBatch>> {
        let no_group = || {
            Error::Server(format!(
                "NOGROUP No such key '{}' or consumer group '{}' in XREADGROUP with GROUP option",
                req.stream, req.group
            ))
        };
        let stream = self.stream_mut(req.stream)?.ok_or_else(no_group)?;
        let MemStream {
            entries, groups, ..
        } = stream;
        let group = groups.get_mut(req.group).ok_or_else(no_group)?;
        let limit = req.count.unwrap_or(usize::MAX);

        let delivered: Vec<Entry> = match req.cursor {
            ReadCursor::Pending(after) => group
                .pending
                .range_mut((std::ops::Bound::Excluded(after), std::ops::Bound::Unbounded))
                .filter(|(_, pe)| pe.consumer == *req.consumer)
                .take(limit)
                .map(|(id, pe)| {
                    pe.delivery_count += 1;
                    Entry {
                        id: *id,
                        fields: entries.get(id).cloned().unwrap_or_default(),
                    }
                })
                .collect(),
            ReadCursor::New => {
                let fresh: Vec<Entry> = entries
                    .range((
                        std::ops::Bound::Excluded(group.last_delivered),
                        std::ops::Bound::Unbounded,
                    ))
                    .take(limit)
                    .map(|(id, fields)| Entry {
                        id: *id,
                        fields: fields.clone(),
                    })
                    .collect();
                for entry in &fresh {
                    group.pending.insert(
                        entry.id,
                        PendingEntry {
                            consumer: req.consumer.clone(),
                            delivery_count: 1,
                        },
                    );
                }
                if let Some(last) = fresh.last() {
                    group.last_delivered = last.id;
                }
                if fresh.is_empty() {
                    return Ok(vec![]);
                }
                fresh
            }
        };

        Ok(vec![StreamBatch {
            stream: req.stream.clone(),
            entries: delivered,
        }])
    }
}

impl MemoryBroker {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` appends fail with a connection error.
    pub fn fail_next_appends(&self, n: u32) {
        self.inner.state.lock().failing_appends = n;
    }

    /// Make the next `n` group reads fail with a connection error.
    pub fn fail_next_reads(&self, n: u32) {
        self.inner.state.lock().failing_reads = n;
    }

    /// Make the next `n` acknowledge batches fail with a connection error.
    pub fn fail_next_acks(&self, n: u32) {
        self.inner.state.lock().failing_acks = n;
    }

    /// Replace `key` with a non-stream value.
    pub fn set_non_stream(&self, key: &StreamKey) {
        self.inner.state.lock().keys.insert(key.clone(), Slot::Other);
    }

    /// Drop a consumer group, as `XGROUP DESTROY` would.
    pub fn destroy_group(&self, stream: &StreamKey, group: &GroupId) -> bool {
        let mut state = self.inner.state.lock();
        match state.keys.get_mut(stream) {
            Some(Slot::Stream(s)) => s.groups.remove(group).is_some(),
            _ => false,
        }
    }

    /// Number of entries retained in `stream`.
    pub fn len(&self, stream: &StreamKey) -> usize {
        match self.inner.state.lock().keys.get(stream) {
            Some(Slot::Stream(s)) => s.entries.len(),
            _ => 0,
        }
    }

    /// Whether `stream` still holds entry `id`.
    pub fn contains(&self, stream: &StreamKey, id: EntryId) -> bool {
        match self.inner.state.lock().keys.get(stream) {
            Some(Slot::Stream(s)) => s.entries.contains_key(&id),
            _ => false,
        }
    }

    /// Whether `group` exists on `stream`.
    pub fn has_group(&self, stream: &StreamKey, group: &GroupId) -> bool {
        match self.inner.state.lock().keys.get(stream) {
            Some(Slot::Stream(s)) => s.groups.contains_key(group),
            _ => false,
        }
    }

    /// Pending IDs of `group`, in ID order.
    pub fn pending(&self, stream: &StreamKey, group: &GroupId) -> Vec<EntryId> {
        match self.inner.state.lock().keys.get(stream) {
            Some(Slot::Stream(s)) => s
                .groups
                .get(group)
                .map(|g| g.pending.keys().copied().collect())
                .unwrap_or_default(),
            _ => vec![],
        }
    }

    /// How many times `id` has been delivered to `group`.
    pub fn delivery_count(&self, stream: &StreamKey, group: &GroupId, id: EntryId) -> u64 {
        match self.inner.state.lock().keys.get(stream) {
            Some(Slot::Stream(s)) => s
                .groups
                .get(group)
                .and_then(|g| g.pending.get(&id))
                .map(|pe| pe.delivery_count)
                .unwrap_or(0),
            _ => 0,
        }
    }

    /// Total group reads served, failed ones included.
    pub fn read_calls(&self) -> u64 {
        self.inner.state.lock().read_calls
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn append(
        &self,
        stream: &StreamKey,
        fields: &[(Bytes, Bytes)],
        retention: Retention,
    ) -> Result<EntryId> {
        let id = {
            let mut state = self.inner.state.lock();
            if state.failing_appends > 0 {
                state.failing_appends -= 1;
                return Err(Error::ConnectionClosed);
            }
            let slot = state
                .keys
                .entry(stream.clone())
                .or_insert_with(|| Slot::Stream(MemStream::default()));
            let Slot::Stream(s) = slot else {
                return Err(Error::Server(WRONGTYPE.into()));
            };
            let id = s.next_id();
            s.entries.insert(id, fields.to_vec());
            s.last_id = id;
            s.trim(retention.max_len);
            id
        };
        self.inner.appended.notify_waiters();
        Ok(id)
    }

    async fn create_group(
        &self,
        stream: &StreamKey,
        group: &GroupId,
        start: GroupStart,
        mkstream: bool,
    ) -> Result<()> {
        let mut state = self.inner.state.lock();
        if state.stream(stream)?.is_none() {
            if !mkstream {
                return Err(Error::Server(
                    "ERR The XGROUP subcommand requires the key to exist. Note that for CREATE you may want to use the MKSTREAM option to create an empty stream automatically.".into(),
                ));
            }
            state
                .keys
                .insert(stream.clone(), Slot::Stream(MemStream::default()));
        }

        let Some(s) = state.stream_mut(stream)? else {
            return Err(Error::ConnectionClosed);
        };
        if s.groups.contains_key(group) {
            return Err(Error::Server(
                "BUSYGROUP Consumer Group name already exists".into(),
            ));
        }
        let last_delivered = match start {
            GroupStart::Tail => s.last_id,
            GroupStart::Beginning => EntryId::MIN,
        };
        s.groups.insert(
            group.clone(),
            MemGroup {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn read_group(&self, req: &ReadGroupRequest<'_>) -> Result<Vec<StreamBatch>> {
        let notified = self.inner.appended.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        let batches = {
            let mut state = self.inner.state.lock();
            state.read_calls += 1;
            if state.failing_reads > 0 {
                state.failing_reads -= 1;
                return Err(Error::ConnectionClosed);
            }
            state.read_now(req)?
        };

        let block = match (req.cursor, req.block) {
            (ReadCursor::New, Some(block)) if batches.is_empty() => block,
            _ => return Ok(batches),
        };

        if block == Duration::ZERO {
            notified.await;
        } else if tokio::time::timeout(block, notified).await.is_err() {
            return Ok(vec![]);
        }
        self.inner.state.lock().read_now(req)
    }

    async fn ack_trim_delete(
        &self,
        stream: &StreamKey,
        group: &GroupId,
        id: EntryId,
        retention: Retention,
    ) -> Result<AckReport> {
        let mut state = self.inner.state.lock();
        if state.failing_acks > 0 {
            state.failing_acks -= 1;
            return Err(Error::ConnectionClosed);
        }
        let Some(s) = state.stream_mut(stream)? else {
            return Ok(AckReport::default());
        };

        let acknowledged = s
            .groups
            .get_mut(group)
            .map(|g| g.pending.remove(&id).is_some() as i64)
            .unwrap_or(0);
        let trimmed = s.trim(retention.max_len) as i64;
        let deleted = s.entries.remove(&id).is_some() as i64;

        Ok(AckReport {
            acknowledged,
            trimmed,
            deleted,
        })
    }
}
