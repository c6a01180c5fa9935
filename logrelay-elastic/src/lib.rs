//! ### `logrelay-elastic`: Elasticsearch delivery port
//!
//! [`ElasticSink`] writes each batch with one `_bulk` request and confirms exactly the
//! records Elasticsearch accepted. Documents are written with the `create` action and the
//! record id as `_id`, so a redelivered record answers `409 Conflict` and counts as confirmed.
//!
//! Indices are named `<prefix><date>`, the date being the record timestamp rendered with
//! [`ElasticOptions::index_date_format`]. An index template is installed on first use,
//! if configured.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_debug_implementations)]

mod bulk;
mod error;
mod options;
mod sink;

pub use bulk::*;
pub use error::*;
pub use options::*;
pub use sink::*;
