//! ### `logrelay-runtime`: Async runtime abstraction
//!
//! This crate provides a small set of functions aligning the type signatures between `async-std` and `tokio`,
//! so that the engine can be built generic to both runtimes.

#[cfg(all(feature = "runtime-async-std", feature = "runtime-tokio"))]
compile_error!("'runtime-async-std' and 'runtime-tokio' cannot be enabled at the same time");

mod sync;
mod task;
mod time;

pub use sync::*;
pub use task::*;
pub use time::*;
