use futures::future::Future;

pub use tokio::task::{JoinError, JoinHandle as TaskHandle};

pub fn spawn_task<F, T>(future: F) -> TaskHandle<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn(future)
}

/// Stop the task at its next suspension point. Awaiting the handle afterwards yields an error.
pub fn abort_task<T>(handle: &TaskHandle<T>) {
    handle.abort();
}
