use futures::future::{abortable, AbortHandle, Aborted, Future, FutureExt};

/// Wraps `async_std::task::JoinHandle` so that it can be aborted by reference,
/// and resolves to a `Result` like tokio's.
pub struct TaskHandle<T> {
    inner: async_std::task::JoinHandle<Result<T, Aborted>>,
    abort: AbortHandle,
}

#[derive(Debug)]
pub struct JoinError;

pub fn spawn_task<F, T>(future: F) -> TaskHandle<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (future, abort) = abortable(future);
    TaskHandle {
        inner: async_std::task::spawn(future),
        abort,
    }
}

/// Stop the task at its next suspension point. Awaiting the handle afterwards yields an error.
pub fn abort_task<T>(handle: &TaskHandle<T>) {
    handle.abort.abort();
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, JoinError>;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        match self.inner.poll_unpin(cx) {
            std::task::Poll::Ready(res) => std::task::Poll::Ready(res.map_err(|_| JoinError)),
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").finish()
    }
}

impl std::fmt::Display for JoinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JoinError")
    }
}

impl std::error::Error for JoinError {}
