use std::{collections::HashMap, time::Duration};

use flume::{Receiver, Sender};
use logrelay_runtime::{abort_task, spawn_task, timeout, TaskHandle};
use logrelay_types::export::futures::Future;

/// Background tasks spawned by a runner, tracked until they finish
/// so that they can be awaited (or aborted) on shutdown.
#[derive(Debug)]
pub(crate) struct TaskSet {
    seq: u64,
    tasks: HashMap<u64, TaskHandle<()>>,
    done_tx: Sender<u64>,
    done_rx: Receiver<u64>,
}

/// Reports completion even if the task panics or is aborted.
#[derive(Debug)]
struct DoneGuard {
    id: u64,
    done: Sender<u64>,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.done.send(self.id).ok();
    }
}

impl TaskSet {
    pub fn new() -> Self {
        let (done_tx, done_rx) = flume::unbounded();
        Self {
            seq: 0,
            tasks: HashMap::new(),
            done_tx,
            done_rx,
        }
    }

    pub fn spawn<F>(&mut self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reap();
        self.seq += 1;
        let id = self.seq;
        let guard = DoneGuard {
            id,
            done: self.done_tx.clone(),
        };
        let handle = spawn_task(async move {
            let _guard = guard;
            future.await;
        });
        self.tasks.insert(id, handle);
    }

    /// Forget the tasks that have finished.
    pub fn reap(&mut self) {
        for id in self.done_rx.try_iter() {
            self.tasks.remove(&id);
        }
    }

    pub fn len(&mut self) -> usize {
        self.reap();
        self.tasks.len()
    }

    /// Wait for every task to finish, up to `grace`; abort the stragglers.
    /// Returns the number of tasks aborted.
    pub async fn shutdown(&mut self, grace: Duration) -> usize {
        self.reap();
        let tasks = &mut self.tasks;
        let done = &self.done_rx;
        let drained = timeout(grace, async move {
            while !tasks.is_empty() {
                match done.recv_async().await {
                    Ok(id) => {
                        tasks.remove(&id);
                    }
                    Err(_) => break,
                }
            }
        })
        .await;
        if drained.is_ok() {
            return 0;
        }
        let aborted = self.tasks.len();
        for (_, handle) in self.tasks.drain() {
            abort_task(&handle);
        }
        aborted
    }
}
