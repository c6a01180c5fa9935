use flume::{Receiver, Sender, TryRecvError};
use logrelay_types::export::futures::{
    future::{pending, select, select_all, Either},
    pin_mut, Future,
};

/// The sending half of a shutdown signal. Triggered explicitly, or by being dropped.
#[derive(Debug)]
pub struct ShutdownHandle {
    sender: Option<Sender<()>>,
}

/// A cloneable shutdown signal. Nothing is ever sent through the channels;
/// shutdown is observed as the disconnection of any of them.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receivers: Vec<Receiver<()>>,
}

/// Create a linked pair of handle and signal.
pub fn shutdown_channel() -> (ShutdownHandle, Shutdown) {
    let (sender, receiver) = flume::bounded(1);
    (
        ShutdownHandle {
            sender: Some(sender),
        },
        Shutdown {
            receivers: vec![receiver],
        },
    )
}

impl ShutdownHandle {
    pub fn trigger(&mut self) {
        self.sender.take();
    }

    pub fn is_triggered(&self) -> bool {
        self.sender.is_none()
    }
}

impl Shutdown {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self {
            receivers: Vec::new(),
        }
    }

    /// A signal that fires when either this one or the returned handle fires.
    pub fn child(&self) -> (ShutdownHandle, Shutdown) {
        let (handle, mut shutdown) = shutdown_channel();
        shutdown.receivers.extend(self.receivers.iter().cloned());
        (handle, shutdown)
    }

    pub fn is_triggered(&self) -> bool {
        self.receivers
            .iter()
            .any(|r| matches!(r.try_recv(), Err(TryRecvError::Disconnected)))
    }

    /// Resolves once shutdown is requested.
    pub async fn wait(&self) {
        if self.receivers.is_empty() {
            return pending().await;
        }
        loop {
            let futs = self.receivers.iter().map(|r| Box::pin(r.recv_async()));
            let (res, _, _) = select_all(futs).await;
            if res.is_err() {
                return;
            }
        }
    }

    /// Run the future to completion, unless shutdown is requested first.
    pub async fn run_until<F: Future>(&self, fut: F) -> Option<F::Output> {
        let wait = self.wait();
        pin_mut!(fut);
        pin_mut!(wait);
        match select(fut, wait).await {
            Either::Left((output, _)) => Some(output),
            Either::Right(_) => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shutdown_trigger() {
        let (mut handle, shutdown) = shutdown_channel();
        let cloned = shutdown.clone();
        assert!(!shutdown.is_triggered());
        handle.trigger();
        assert!(handle.is_triggered());
        assert!(shutdown.is_triggered());
        assert!(cloned.is_triggered());
    }

    #[test]
    fn test_shutdown_on_drop() {
        let (handle, shutdown) = shutdown_channel();
        drop(handle);
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn test_shutdown_child() {
        let (mut parent_handle, parent) = shutdown_channel();
        let (mut child_handle, child) = parent.child();
        child_handle.trigger();
        assert!(child.is_triggered());
        assert!(!parent.is_triggered());

        let (_child_handle, child) = parent.child();
        assert!(!child.is_triggered());
        parent_handle.trigger();
        assert!(child.is_triggered());
    }

    #[test]
    fn test_shutdown_never() {
        assert!(!Shutdown::never().is_triggered());
        let (_handle, child) = Shutdown::never().child();
        assert!(!child.is_triggered());
    }
}
