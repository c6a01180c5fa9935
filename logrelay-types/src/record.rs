use std::time::Duration;

use crate::{timestamp_from_millis, timestamp_to_millis, RecordErr, RecordId, Timestamp};

/// The field holding the production time of a record, in epoch milliseconds.
pub const TIMESTAMP_FIELD: &str = "Timestamp";
/// The field holding the serialized log payload.
pub const DATA_FIELD: &str = "Data";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
/// One unit of queued work: a log record appended to a stream.
pub struct StreamRecord {
    id: RecordId,
    timestamp: Timestamp,
    payload: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
/// The result of one `>` read.
pub struct ReadBatch {
    /// The entries that parsed into records.
    pub records: Vec<StreamRecord>,
    /// Number of entries the read handed out, malformed ones included.
    /// Zero, and only zero, means the stream is drained.
    pub read: usize,
}

impl ReadBatch {
    pub fn is_drained(&self) -> bool {
        self.read == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// An entry in the Pending Entry List: delivered to `consumer`, not yet acknowledged.
pub struct PendingEntry {
    pub id: RecordId,
    pub consumer: String,
    /// Time since the entry was last delivered or claimed.
    pub idle: Duration,
    pub delivery_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A consumer identity registered in a group.
pub struct ConsumerInfo {
    pub name: String,
    /// Number of entries owned by this consumer in the Pending Entry List.
    pub pending: u64,
    /// Time since the consumer last read or claimed anything.
    pub idle: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A consumer group registered on a stream.
pub struct GroupInfo {
    pub name: String,
    pub consumers: u64,
    pub pending: u64,
    pub last_delivered_id: Option<RecordId>,
}

impl StreamRecord {
    pub fn new(id: RecordId, timestamp: Timestamp, payload: String) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }

    pub fn id(&self) -> &RecordId {
        &self.id
    }

    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn into_payload(self) -> String {
        self.payload
    }

    /// Map the field-value pairs of a raw stream entry into a record.
    ///
    /// `Data` is mandatory. A missing or unparsable `Timestamp` falls back to the
    /// time encoded in the record id. Unknown fields are ignored.
    pub fn from_fields<I>(id: RecordId, fields: I) -> Result<Self, RecordErr>
    where
        I: IntoIterator<Item = (String, Vec<u8>)>,
    {
        let mut timestamp = None;
        let mut payload = None;
        for (field, value) in fields {
            match field.as_str() {
                TIMESTAMP_FIELD => {
                    timestamp = std::str::from_utf8(&value)
                        .ok()
                        .and_then(|s| s.parse::<i128>().ok())
                        .and_then(|millis| timestamp_from_millis(millis).ok());
                }
                DATA_FIELD => {
                    payload = Some(
                        String::from_utf8(value).map_err(|_| RecordErr::NotUtf8(DATA_FIELD))?,
                    );
                }
                _ => (),
            }
        }
        let payload = payload.ok_or(RecordErr::MissingField(DATA_FIELD))?;
        let timestamp = match timestamp {
            Some(timestamp) => timestamp,
            None => id.timestamp()?,
        };
        Ok(Self::new(id, timestamp, payload))
    }
}

/// Encode a record for `XADD`. Rejects an empty payload.
pub fn encode_fields(
    timestamp: &Timestamp,
    payload: &str,
) -> Result<[(&'static str, String); 2], RecordErr> {
    if payload.is_empty() {
        return Err(RecordErr::EmptyPayload);
    }
    Ok([
        (TIMESTAMP_FIELD, timestamp_to_millis(timestamp).to_string()),
        (DATA_FIELD, payload.to_owned()),
    ])
}
