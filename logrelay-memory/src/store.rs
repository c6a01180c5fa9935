use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use flume::{Receiver, Sender, TrySendError};
use logrelay_types::{
    encode_fields, export::async_trait, AutoStreamReset, ConsumerGroup, ConsumerId, ConsumerInfo,
    GroupInfo, IdBound, PendingEntry, ReadBatch, RecordId, StreamErr, StreamKey, StreamRecord,
    StreamStore, Timestamp,
};

use crate::{
    error::unavailable,
    stream::{group_not_found, MemStream},
    MemoryErr, MemoryResult,
};

/// A [`StreamStore`] kept in process memory, with the consumer-group semantics of Redis Streams.
///
/// Its clock can be moved forward with [`MemoryStore::advance`], so that idle times
/// can be exercised without waiting. It can also be made to fail every command.
#[derive(Debug)]
pub struct MemoryStore {
    streams: Mutex<HashMap<StreamKey, MemStream>>,
    skew: Mutex<Duration>,
    unavailable: AtomicBool,
    subscribers: Mutex<Vec<Sender<()>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            streams: Default::default(),
            skew: Default::default(),
            unavailable: AtomicBool::new(false),
            subscribers: Default::default(),
        }
    }

    /// Move the clock of this store forward. Affects idle times only, not record ids.
    pub fn advance(&self, by: Duration) {
        *lock(&self.skew) += by;
    }

    /// Make every subsequent command fail with [`MemoryErr::Unavailable`], or recover.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Append a record with an auto-generated id.
    pub fn append(
        &self,
        stream: &StreamKey,
        timestamp: &Timestamp,
        payload: &str,
    ) -> MemoryResult<RecordId> {
        let fields = encode_fields(timestamp, payload)?
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.into_bytes()))
            .collect();
        self.append_fields(stream, None, fields)
    }

    /// Append raw field-value pairs, optionally with an explicit id.
    /// An explicit id must be greater than every id already in the stream.
    pub fn append_fields(
        &self,
        stream: &StreamKey,
        id: Option<RecordId>,
        fields: Vec<(String, Vec<u8>)>,
    ) -> MemoryResult<RecordId> {
        self.check()?;
        let mut streams = lock(&self.streams);
        let s = streams.entry(stream.clone()).or_default();
        let id = match id {
            Some(id) => id,
            None => s.next_id(wall_millis()),
        };
        s.append(id, fields)
    }

    /// Number of entries in the stream.
    pub fn len(&self, stream: &StreamKey) -> usize {
        lock(&self.streams).get(stream).map_or(0, |s| s.len())
    }

    /// A receiver of wake-up signals, one per [`MemoryStore::publish`].
    pub fn subscribe(&self) -> Receiver<()> {
        let (sender, receiver) = flume::bounded(1);
        lock(&self.subscribers).push(sender);
        receiver
    }

    /// Signal every subscriber. Returns the number of subscribers reached.
    pub fn publish(&self) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|s| !matches!(s.try_send(()), Err(TrySendError::Disconnected(_))));
        subscribers.len()
    }

    fn now(&self) -> Instant {
        Instant::now() + *lock(&self.skew)
    }

    fn check(&self) -> MemoryResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            unavailable()
        } else {
            Ok(())
        }
    }

    fn with_stream<T, F>(&self, stream: &StreamKey, group: &str, f: F) -> MemoryResult<T>
    where
        F: FnOnce(&mut MemStream, Instant) -> MemoryResult<T>,
    {
        self.check()?;
        let now = self.now();
        let mut streams = lock(&self.streams);
        match streams.get_mut(stream) {
            Some(s) => f(s, now),
            None => Err(group_not_found(stream, group)),
        }
    }
}

#[async_trait]
impl StreamStore for MemoryStore {
    type Error = MemoryErr;

    async fn exists(&self, stream: &StreamKey) -> MemoryResult<bool> {
        self.check()?;
        Ok(lock(&self.streams).contains_key(stream))
    }

    async fn groups(&self, stream: &StreamKey) -> MemoryResult<Vec<GroupInfo>> {
        self.check()?;
        Ok(lock(&self.streams)
            .get(stream)
            .map(|s| s.groups())
            .unwrap_or_default())
    }

    async fn create_group(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        reset: AutoStreamReset,
    ) -> MemoryResult<()> {
        self.check()?;
        let mut streams = lock(&self.streams);
        let s = streams.entry(stream.clone()).or_default();
        if s.create_group(group.name(), reset) {
            Ok(())
        } else {
            Err(StreamErr::GroupExists {
                stream: stream.name().to_owned(),
                group: group.name().to_owned(),
            })
        }
    }

    async fn consumers(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
    ) -> MemoryResult<Vec<ConsumerInfo>> {
        self.with_stream(stream, group.name(), |s, now| {
            s.consumers(stream, group.name(), now)
        })
    }

    async fn create_consumer(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
    ) -> MemoryResult<bool> {
        self.with_stream(stream, group.name(), |s, now| {
            s.create_consumer(stream, group.name(), consumer.id(), now)
        })
    }

    async fn delete_consumer(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
    ) -> MemoryResult<u64> {
        self.with_stream(stream, group.name(), |s, _| {
            s.delete_consumer(stream, group.name(), consumer.id())
        })
    }

    async fn read_group(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
        count: usize,
    ) -> MemoryResult<ReadBatch> {
        self.with_stream(stream, group.name(), |s, now| {
            s.read_group(stream, group.name(), consumer.id(), count, now)
        })
    }

    async fn pending(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        start: IdBound,
        count: usize,
    ) -> MemoryResult<Vec<PendingEntry>> {
        self.with_stream(stream, group.name(), |s, now| {
            s.pending(stream, group.name(), start, count, now)
        })
    }

    async fn claim(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
        min_idle: Duration,
        ids: &[RecordId],
    ) -> MemoryResult<Vec<StreamRecord>> {
        self.with_stream(stream, group.name(), |s, now| {
            s.claim(stream, group.name(), consumer.id(), min_idle, ids, now)
        })
    }

    async fn ack(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        ids: &[RecordId],
    ) -> MemoryResult<u64> {
        self.with_stream(stream, group.name(), |s, _| s.ack(stream, group.name(), ids))
    }

    async fn trim_before(&self, stream: &StreamKey, min_id: RecordId) -> MemoryResult<u64> {
        self.check()?;
        Ok(lock(&self.streams)
            .get_mut(stream)
            .map_or(0, |s| s.trim_before(min_id)))
    }

    async fn ping(&self) -> MemoryResult<String> {
        self.check()?;
        Ok("PONG".to_owned())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // no user code runs while a lock is held
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn wall_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}
