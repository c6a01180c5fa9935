use std::sync::Arc;

use crate::{RecordId, StreamRecord};
use async_trait::async_trait;
use thiserror::Error;

/// Type alias of the [`Result`] type returned by Delivery Ports.
pub type DeliveryResult<T> = std::result::Result<T, DeliveryErr>;

#[derive(Error, Debug)]
/// Errors a downstream sink may raise. Any of these counts as zero confirmed ids for the batch.
pub enum DeliveryErr {
    #[error("Sink rejected the batch: {0}")]
    Rejected(String),
    #[error("Sink unavailable: {0}")]
    Unavailable(String),
    #[error("Sink error: {0}")]
    Sink(Box<dyn std::error::Error + Send + Sync>),
}

#[async_trait]
/// A downstream sink that confirms which records it durably accepted.
///
/// Only the returned ids will be acknowledged; everything else stays pending and will be redelivered.
/// Delivery is at-least-once, so implementations must tolerate records they have already written.
pub trait DeliveryPort: std::fmt::Debug + Send + Sync {
    async fn deliver(&self, records: &[StreamRecord]) -> DeliveryResult<Vec<RecordId>>;
}

#[async_trait]
/// A fire-and-forget sink. Returning `Ok` confirms the whole batch.
pub trait DeliveryHook: std::fmt::Debug + Send + Sync {
    async fn invoke(&self, records: &[StreamRecord]) -> DeliveryResult<()>;
}

#[async_trait]
impl<T: DeliveryPort + ?Sized> DeliveryPort for Arc<T> {
    async fn deliver(&self, records: &[StreamRecord]) -> DeliveryResult<Vec<RecordId>> {
        (**self).deliver(records).await
    }
}

#[async_trait]
impl<T: DeliveryPort + ?Sized> DeliveryPort for Box<T> {
    async fn deliver(&self, records: &[StreamRecord]) -> DeliveryResult<Vec<RecordId>> {
        (**self).deliver(records).await
    }
}

impl DeliveryErr {
    pub fn sink<E: std::error::Error + Send + Sync + 'static>(e: E) -> Self {
        Self::Sink(Box::new(e))
    }
}
