//! # LogRelay
//!
//! At-least-once delivery of application logs queued in Redis Streams.
//!
//! Producers append log records to a stream and publish a wake-up notification.
//! Relays consume the stream as members of a consumer group, hand every batch to a
//! [`DeliveryPort`] such as Elasticsearch, and acknowledge only what the port confirmed.
//! Whatever a crashed relay left pending is reclaimed by its peers.
//!
//! ## Architecture
//!
//! `logrelay` is the facade crate re-exporting implementation from a number of sub-crates:
//!
//! + `logrelay-types`: records, ids, errors and the [`StreamStore`] / [`DeliveryPort`] traits
//! + `logrelay-engine`: group bootstrap, active consumption, reclaim, limiter, supervisor
//! + `logrelay-redis`: the Redis Streams backend and producer (feature `redis`)
//! + `logrelay-memory`: an in-process backend for tests (feature `memory`)
//! + `logrelay-elastic`: the Elasticsearch delivery port (feature `elastic`)
//! + `logrelay-runtime`: the `tokio` / `async-std` abstraction

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use logrelay_engine::*;
pub use logrelay_types::*;

#[cfg(feature = "elastic")]
#[cfg_attr(docsrs, doc(cfg(feature = "elastic")))]
pub use logrelay_elastic as elastic;
#[cfg(feature = "memory")]
#[cfg_attr(docsrs, doc(cfg(feature = "memory")))]
pub use logrelay_memory as memory;
#[cfg(feature = "redis")]
#[cfg_attr(docsrs, doc(cfg(feature = "redis")))]
pub use logrelay_redis as redis;
pub use logrelay_runtime as runtime;
