use std::sync::Arc;

use logrelay_types::{RecordId, StreamKey, Timestamp};

use crate::{MemoryResult, MemoryStore};

/// Appends records to one stream of a [`MemoryStore`] and wakes its subscribers.
#[derive(Debug, Clone)]
pub struct MemoryProducer {
    store: Arc<MemoryStore>,
    stream: StreamKey,
}

impl MemoryProducer {
    pub fn new(store: Arc<MemoryStore>, stream: StreamKey) -> Self {
        Self { store, stream }
    }

    pub fn stream_key(&self) -> &StreamKey {
        &self.stream
    }

    /// Append a record stamped with the current time, then publish a wake-up.
    pub fn send(&self, payload: &str) -> MemoryResult<RecordId> {
        self.send_at(&Timestamp::now_utc(), payload)
    }

    pub fn send_at(&self, timestamp: &Timestamp, payload: &str) -> MemoryResult<RecordId> {
        let id = self.store.append(&self.stream, timestamp, payload)?;
        self.store.publish();
        Ok(id)
    }

    /// Append every payload, then publish a single wake-up.
    pub fn send_batch<'a, I>(&self, payloads: I) -> MemoryResult<Vec<RecordId>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let now = Timestamp::now_utc();
        let ids = payloads
            .into_iter()
            .map(|payload| self.store.append(&self.stream, &now, payload))
            .collect::<MemoryResult<Vec<_>>>()?;
        self.store.publish();
        Ok(ids)
    }
}
