use std::{fmt::Display, str::FromStr, sync::Arc};
pub use time::OffsetDateTime as Timestamp;

use crate::{RecordErr, StreamKeyErr};

/// Maximum string length of a stream key.
pub const MAX_STREAM_KEY_LEN: usize = 249;

/// Canonical display format for Timestamp.
pub const TIMESTAMP_FORMAT: &[time::format_description::FormatItem<'static>] =
    time::macros::format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]");

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
/// Identifies a stream. It is the key of the Redis Stream.
pub struct StreamKey {
    name: Arc<String>,
}

/// The Redis stream entry id comprises two 64 bit integers: the millisecond timestamp
/// at which the entry was appended and a sequence number within that millisecond.
///
/// Ids are totally ordered, and the order equals the append order of the stream.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    millis: u64,
    seq: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// One end of an id range, as used by `XPENDING` and `XRANGE`.
pub enum IdBound {
    /// -
    Minus,
    /// +
    Plus,
    /// Inclusive
    Inclusive(RecordId),
    /// Exclusive
    Exclusive(RecordId),
}

impl StreamKey {
    pub fn new<S: Into<String>>(key: S) -> Result<Self, StreamKeyErr> {
        let key = key.into();
        if is_valid_stream_key(key.as_str()) {
            Ok(Self {
                name: Arc::new(key),
            })
        } else {
            Err(StreamKeyErr::InvalidStreamKey)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl FromStr for StreamKey {
    type Err = StreamKeyErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StreamKey::new(s)
    }
}

pub fn is_valid_stream_key(s: &str) -> bool {
    !s.is_empty() && s.len() <= MAX_STREAM_KEY_LEN && s.chars().all(is_valid_stream_key_char)
}

/// Returns true if this character can be used in a stream key.
pub fn is_valid_stream_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':')
}

impl RecordId {
    /// The smallest possible id, `0-0`.
    pub const ZERO: Self = Self::new(0, 0);

    pub const fn new(millis: u64, seq: u64) -> Self {
        Self { millis, seq }
    }

    /// The first id at the given millisecond.
    pub const fn from_millis(millis: u64) -> Self {
        Self::new(millis, 0)
    }

    pub fn millis(&self) -> u64 {
        self.millis
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The point in time this id was assigned by the store.
    pub fn timestamp(&self) -> Result<Timestamp, RecordErr> {
        timestamp_from_millis(self.millis as i128)
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.millis, self.seq)
    }
}

/// Accepts `<millis>-<seq>`, or `<millis>` alone which means sequence 0.
impl FromStr for RecordId {
    type Err = RecordErr;

    fn from_str(id: &str) -> Result<Self, Self::Err> {
        let err = || RecordErr::InvalidId(id.to_owned());
        let (millis, seq) = match id.split_once('-') {
            Some((millis, seq)) => (millis, seq),
            None => (id, "0"),
        };
        let millis = millis.parse::<u64>().map_err(|_| err())?;
        let seq = seq.parse::<u64>().map_err(|_| err())?;
        Ok(Self::new(millis, seq))
    }
}

impl IdBound {
    pub fn format(&self) -> String {
        match self {
            Self::Minus => "-".to_owned(),
            Self::Plus => "+".to_owned(),
            Self::Inclusive(id) => id.to_string(),
            Self::Exclusive(id) => format!("({id}"),
        }
    }

    /// Whether `id` lies on the inner side of this bound, when used as the start of a range.
    pub fn admits_from(&self, id: &RecordId) -> bool {
        match self {
            Self::Minus => true,
            Self::Plus => false,
            Self::Inclusive(start) => id >= start,
            Self::Exclusive(start) => id > start,
        }
    }
}

impl Display for IdBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format())
    }
}

/// Convert epoch milliseconds into a Timestamp.
pub fn timestamp_from_millis(millis: i128) -> Result<Timestamp, RecordErr> {
    Timestamp::from_unix_timestamp_nanos(millis * 1_000_000)
        .map_err(|e| RecordErr::InvalidTimestamp(format!("{millis}: {e}")))
}

/// Convert a Timestamp into epoch milliseconds. Sub-millisecond precision is truncated.
pub fn timestamp_to_millis(ts: &Timestamp) -> i64 {
    (ts.unix_timestamp_nanos() / 1_000_000) as i64
}
