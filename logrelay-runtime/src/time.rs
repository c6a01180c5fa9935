//! Timers of the enabled runtime.

use std::{future::Future, time::Duration};

#[cfg(feature = "runtime-tokio")]
pub use tokio::time::error::Elapsed as TimeoutError;

#[cfg(feature = "runtime-async-std")]
pub use async_std::future::TimeoutError;

/// Suspend the current task for `duration`.
pub async fn sleep(duration: Duration) {
    #[cfg(feature = "runtime-tokio")]
    tokio::time::sleep(duration).await;

    #[cfg(feature = "runtime-async-std")]
    async_std::task::sleep(duration).await;

    #[cfg(not(any(feature = "runtime-tokio", feature = "runtime-async-std")))]
    no_rt::unavailable(duration);
}

/// Await `future`, giving up after `duration`.
pub async fn timeout<F, T>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    #[cfg(feature = "runtime-tokio")]
    return tokio::time::timeout(duration, future).await;

    #[cfg(feature = "runtime-async-std")]
    return async_std::future::timeout(duration, future).await;

    #[cfg(not(any(feature = "runtime-tokio", feature = "runtime-async-std")))]
    {
        drop(future);
        Err(TimeoutError(duration))
    }
}

#[cfg(not(any(feature = "runtime-tokio", feature = "runtime-async-std")))]
pub use no_rt::TimeoutError;

#[cfg(not(any(feature = "runtime-tokio", feature = "runtime-async-std")))]
mod no_rt {
    use std::time::Duration;

    /// Without a runtime every timeout elapses immediately.
    #[derive(Debug)]
    pub struct TimeoutError(pub(crate) Duration);

    impl std::fmt::Display for TimeoutError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "no runtime enabled to time {:?}", self.0)
        }
    }

    impl std::error::Error for TimeoutError {}

    pub(super) fn unavailable(duration: Duration) -> ! {
        panic!("Cannot sleep for {duration:?}: enable `runtime-tokio` or `runtime-async-std`")
    }
}
