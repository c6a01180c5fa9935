//! ### `logrelay-redis`: Redis backend
//!
//! This crate implements the backing-store primitives of `logrelay` on Redis Streams:
//!
//! + [`RedisStore`] implements [`StreamStore`](logrelay_types::StreamStore) with `XREADGROUP`,
//!   `XPENDING`, `XCLAIM`, `XACK`, `XINFO`, `XGROUP` and `XTRIM`
//! + [`RedisProducer`] appends records with `XADD ... MAXLEN ~` and publishes a wake-up
//!   notification, pipelined in a background task
//! + [`subscribe_notifications`] turns the notification channel into a stream of wake-ups,
//!   resubscribing when the connection drops
//!
//! Every command goes through a [`Connection`] that reconnects with exponential backoff.
//! Commands slower than [`RedisConnectOptions::slow_command_threshold`] are logged as warnings.
//!
//! This crate is built on top of [`redis`](https://docs.rs/redis).

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_debug_implementations)]

/// The default Redis port number
pub const REDIS_PORT: u16 = 6379;

/// The default timeout, if needed but unspecified
pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(60);

/// The default channel on which producers announce new records
pub const DEFAULT_NOTIFICATION_CHANNEL: &str = "logrelay";

/// The default approximate cap on the length of a stream
pub const DEFAULT_MAX_LEN: usize = 65535;

#[cfg(all(feature = "runtime-async-std", feature = "runtime-tokio"))]
compile_error!("'runtime-async-std' and 'runtime-tokio' cannot be enabled at the same time");

mod connection;
mod error;
mod notifier;
mod options;
mod producer;
mod reply;
mod store;

pub use connection::*;
pub use error::*;
pub use notifier::*;
pub use options::*;
pub use producer::*;
pub use reply::*;
pub use store::*;
