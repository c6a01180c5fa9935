use std::sync::Arc;

use logrelay_types::{
    AutoStreamReset, ConsumerGroup, ConsumerId, StreamErr, StreamKey, StreamResult, StreamStore,
};

/// Creates consumer groups and registers consumers, idempotently.
///
/// Holds no state of its own: every decision is made by asking the store,
/// so any number of processes may bootstrap the same group concurrently.
#[derive(Debug)]
pub struct GroupManager<S> {
    store: Arc<S>,
}

impl<S> Clone for GroupManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: StreamStore> GroupManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Create the group (and the stream) unless it already exists. Returns whether it was created here.
    ///
    /// Losing a creation race to another process is not an error.
    pub async fn ensure_group(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        reset: AutoStreamReset,
    ) -> StreamResult<bool, S::Error> {
        if self.store.exists(stream).await? {
            let groups = self.store.groups(stream).await?;
            if groups.iter().any(|g| g.name == group.name()) {
                log::trace!("Group {group} exists on stream {stream}");
                return Ok(false);
            }
        }
        match self.store.create_group(stream, group, reset).await {
            Ok(()) => {
                log::info!(
                    "Created group {group} on stream {stream} starting from {}",
                    reset.group_start_id()
                );
                Ok(true)
            }
            Err(StreamErr::GroupExists { .. }) => {
                log::warn!("Group {group} on stream {stream} was created concurrently");
                Ok(false)
            }
            Err(err) => {
                log::error!("Failed to create group {group} on stream {stream}: {err}");
                Err(err)
            }
        }
    }

    /// Register the consumer in the group unless it is already there. Returns whether it was created here.
    pub async fn ensure_consumer(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
    ) -> StreamResult<bool, S::Error> {
        let consumers = self.store.consumers(stream, group).await?;
        if consumers.iter().any(|c| c.name == consumer.id()) {
            log::trace!("Consumer {consumer} exists in group {group} of stream {stream}");
            return Ok(false);
        }
        let created = self.store.create_consumer(stream, group, consumer).await?;
        if created {
            log::info!("Registered consumer {consumer} in group {group} of stream {stream}");
        }
        Ok(created)
    }

    /// Ensure both the group and the consumer.
    pub async fn bootstrap(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
        reset: AutoStreamReset,
    ) -> StreamResult<(), S::Error> {
        self.ensure_group(stream, group, reset).await?;
        self.ensure_consumer(stream, group, consumer).await?;
        Ok(())
    }
}
