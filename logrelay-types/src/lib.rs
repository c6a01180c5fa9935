//! # LogRelay Types
//!
//! This crate defines the traits and types shared by the LogRelay engine and its backends,
//! but does not provide any implementation.
//!
//! The two seams are [`StreamStore`], the stream / consumer-group primitives of the backing store,
//! and [`DeliveryPort`], the downstream sink that confirms which records it durably accepted.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_debug_implementations)]

mod delivery;
mod error;
mod group;
mod record;
mod store;
mod stream;
mod store_url;

pub use delivery::*;
pub use error::*;
pub use group::*;
pub use record::*;
pub use store::*;
pub use stream::*;
pub use store_url::*;

pub mod export;
