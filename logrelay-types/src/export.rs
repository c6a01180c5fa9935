//! Re-exports of the dependencies that appear in our public API.

pub use async_trait::async_trait;
pub use futures;
pub use time;
pub use url;
