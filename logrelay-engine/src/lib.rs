//! ### `logrelay-engine`: at-least-once consumption of a log stream
//!
//! The engine drives one stream key of a [`StreamStore`](logrelay_types::StreamStore) with
//! consumer-group semantics:
//!
//! + [`GroupManager`] creates the consumer group and registers the consumer, idempotently.
//! + [`ActiveConsumer`] drains never-delivered records whenever its [`Trigger`] fires,
//!   hands each batch to a [`DeliveryPort`](logrelay_types::DeliveryPort), and acknowledges
//!   only the ids the port confirms.
//! + [`ReclaimScanner`] claims entries left pending by dead or stalled consumers,
//!   delivers them again, and evicts consumer identities that went away.
//! + [`ConcurrencyLimiter`] ensures one drain per stream key at a time.
//! + [`Supervisor`] relaunches the whole runner set on failure, up to a retry limit.
//! + [`HealthProbe`] and [`RetentionSweeper`] keep an eye on the store.
//!
//! [`Engine`] wires all of the above from an [`EngineOptions`].

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_debug_implementations)]

mod consumer;
mod delivery;
mod engine;
mod group;
mod health;
mod limiter;
mod options;
mod reclaim;
mod retention;
mod shutdown;
mod supervisor;
mod task;
mod trigger;

pub use consumer::*;
pub use delivery::{AllOf, BatchReport, FireAndForget, IdRange};
pub use engine::*;
pub use group::*;
pub use health::*;
pub use limiter::*;
pub use options::*;
pub use reclaim::*;
pub use retention::*;
pub use shutdown::*;
pub use supervisor::*;
pub use trigger::*;
