use thiserror::Error;

use crate::DeliveryErr;

/// Type alias of the [`Result`] type specific to `logrelay`.
pub type StreamResult<T, E> = std::result::Result<T, StreamErr<E>>;

#[derive(Error, Debug)]
/// Common errors that may occur. `E` is the error type of the backing store.
pub enum StreamErr<E: std::error::Error> {
    #[error("Connection Error: {0}")]
    Connect(String),
    #[error("Configuration Error: {0}")]
    Config(String),
    #[error("Consumer group `{group}` does not exist on stream `{stream}`")]
    GroupNotFound { stream: String, group: String },
    #[error("Consumer group `{group}` already exists on stream `{stream}`")]
    GroupExists { stream: String, group: String },
    #[error("StreamKeyErr {0}")]
    StreamKeyErr(#[from] StreamKeyErr),
    #[error("StoreUrlErr {0}")]
    StoreUrlErr(#[from] StoreUrlErr),
    #[error("RecordErr {0}")]
    Record(#[from] RecordErr),
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryErr),
    #[error("Gave up after {retries} restarts, last error: {last}")]
    RetryExhausted { retries: u32, last: String },
    #[error("Backend error: {0}")]
    Backend(E),
    #[error("Runtime error: {0}")]
    Runtime(Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors that may happen when handling StreamKey
pub enum StreamKeyErr {
    #[error("Invalid stream key: valid pattern is [a-zA-Z0-9._:-]{{1, 249}}")]
    InvalidStreamKey,
}

#[derive(Error, Debug)]
/// Errors that may happen when parsing a store connection string
pub enum StoreUrlErr {
    #[error("UrlParseError {0}")]
    UrlParseError(#[from] url::ParseError),
    #[error("Connection string is empty")]
    Empty,
    #[error("Host is required")]
    HostRequired,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors that may happen when mapping a raw stream entry into a record
pub enum RecordErr {
    #[error("Failed to parse record ID: {0}")]
    InvalidId(String),
    #[error("Missing field `{0}`")]
    MissingField(&'static str),
    #[error("Field `{0}` is not valid UTF-8")]
    NotUtf8(&'static str),
    #[error("Timestamp out of range: {0}")]
    InvalidTimestamp(String),
    #[error("Payload is empty")]
    EmptyPayload,
}

impl<E: std::error::Error> StreamErr<E> {
    /// Whether the store reported that the consumer group is missing.
    pub fn is_group_not_found(&self) -> bool {
        matches!(self, Self::GroupNotFound { .. })
    }
}

/// Function to construct a [`StreamErr::Runtime`] error variant.
pub fn runtime_error<T: std::error::Error, E: std::error::Error + Send + Sync + 'static>(
    e: E,
) -> StreamErr<T> {
    StreamErr::Runtime(Box::new(e))
}
