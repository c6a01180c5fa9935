use logrelay_types::{RecordId, StreamErr, StreamResult};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors raised by the in-memory store.
pub enum MemoryErr {
    #[error("Store is unavailable")]
    Unavailable,
    #[error("The ID specified ({0}) is equal or smaller than the target stream top item ({1})")]
    IdTooSmall(RecordId, RecordId),
}

pub type MemoryResult<T> = StreamResult<T, MemoryErr>;

pub(crate) fn unavailable<T>() -> MemoryResult<T> {
    Err(StreamErr::Backend(MemoryErr::Unavailable))
}
