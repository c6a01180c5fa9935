//! ### `logrelay-memory`: in-memory backend
//!
//! [`MemoryStore`] implements [`StreamStore`](logrelay_types::StreamStore) entirely in process
//! memory, following the consumer-group semantics of Redis Streams: `>` reads, a Pending Entry
//! List per group, claims gated on idle time, and consumer registration. Its clock can be
//! advanced by hand and it can be made unavailable, which makes it the backend of choice for
//! exercising the engine in tests.

#![deny(missing_debug_implementations)]

mod error;
mod producer;
mod store;
mod stream;

pub use error::*;
pub use producer::*;
pub use store::*;
