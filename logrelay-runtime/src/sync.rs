//! The async mutex of the enabled runtime.

#[cfg(feature = "runtime-tokio")]
pub use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

#[cfg(feature = "runtime-async-std")]
pub use async_std::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

#[cfg(not(any(feature = "runtime-tokio", feature = "runtime-async-std")))]
pub use no_rt::{AsyncMutex, AsyncMutexGuard};

#[cfg(not(any(feature = "runtime-tokio", feature = "runtime-async-std")))]
mod no_rt {
    use std::{
        marker::PhantomData,
        ops::{Deref, DerefMut},
    };

    /// Type-checks like the real thing; every access panics.
    #[derive(Debug)]
    pub struct AsyncMutex<T> {
        value: PhantomData<T>,
    }

    #[derive(Debug)]
    pub struct AsyncMutexGuard<'a, T> {
        value: PhantomData<&'a mut T>,
    }

    impl<T> AsyncMutex<T> {
        pub fn new(_: T) -> Self {
            Self { value: PhantomData }
        }

        pub async fn lock(&self) -> AsyncMutexGuard<'_, T> {
            AsyncMutexGuard { value: PhantomData }
        }
    }

    impl<T> Deref for AsyncMutexGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &T {
            panic!("AsyncMutex needs `runtime-tokio` or `runtime-async-std`")
        }
    }

    impl<T> DerefMut for AsyncMutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut T {
            panic!("AsyncMutex needs `runtime-tokio` or `runtime-async-std`")
        }
    }
}
