use std::time::Duration;

use crate::{
    AutoStreamReset, ConsumerGroup, ConsumerId, ConsumerInfo, GroupInfo, IdBound, PendingEntry,
    ReadBatch, RecordId, StreamKey, StreamRecord, StreamResult,
};
use async_trait::async_trait;

#[async_trait]
/// The stream and consumer-group primitives of the backing store.
///
/// All coordination (ownership of pending entries, consumer registration) is delegated to the store.
/// Implementations must map a missing group to [`crate::StreamErr::GroupNotFound`]
/// and a concurrently created group to [`crate::StreamErr::GroupExists`].
pub trait StreamStore: std::fmt::Debug + Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether the stream key exists.
    async fn exists(&self, stream: &StreamKey) -> StreamResult<bool, Self::Error>;

    /// Groups registered on the stream. Empty if the stream does not exist.
    async fn groups(&self, stream: &StreamKey) -> StreamResult<Vec<GroupInfo>, Self::Error>;

    /// Create the group, and the stream if it does not exist.
    async fn create_group(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        reset: AutoStreamReset,
    ) -> StreamResult<(), Self::Error>;

    /// Consumers registered in the group.
    async fn consumers(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
    ) -> StreamResult<Vec<ConsumerInfo>, Self::Error>;

    /// Register a consumer. Returns false if it already existed.
    async fn create_consumer(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
    ) -> StreamResult<bool, Self::Error>;

    /// Deregister a consumer. Returns the number of pending entries it owned.
    async fn delete_consumer(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
    ) -> StreamResult<u64, Self::Error>;

    /// Read up to `count` never-delivered entries (the `>` cursor), assigning them to `consumer`.
    /// Returns immediately. Entries that do not parse are assigned all the same and counted
    /// in [`ReadBatch::read`], so a read of nothing but malformed entries is not mistaken for the end.
    async fn read_group(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
        count: usize,
    ) -> StreamResult<ReadBatch, Self::Error>;

    /// Page through the Pending Entry List in ascending id order.
    async fn pending(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        start: IdBound,
        count: usize,
    ) -> StreamResult<Vec<PendingEntry>, Self::Error>;

    /// Transfer ownership of the given pending entries to `consumer`, resetting their idle time.
    /// Entries that have been idle for less than `min_idle` are left untouched and not returned.
    async fn claim(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
        min_idle: Duration,
        ids: &[RecordId],
    ) -> StreamResult<Vec<StreamRecord>, Self::Error>;

    /// Acknowledge entries, removing them from the Pending Entry List. Idempotent.
    /// Returns the number of entries actually removed.
    async fn ack(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        ids: &[RecordId],
    ) -> StreamResult<u64, Self::Error>;

    /// Remove all entries with id lower than `min_id`. Returns the number removed.
    async fn trim_before(
        &self,
        stream: &StreamKey,
        min_id: RecordId,
    ) -> StreamResult<u64, Self::Error>;

    /// Liveness check.
    async fn ping(&self) -> StreamResult<String, Self::Error>;
}
