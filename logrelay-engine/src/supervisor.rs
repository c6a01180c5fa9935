use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};

use logrelay_runtime::{abort_task, sleep, spawn_task, timeout, JoinError, TaskHandle};
use logrelay_types::{
    export::{
        async_trait,
        futures::{stream::FuturesUnordered, Future, StreamExt},
    },
    StreamErr, StreamResult,
};

use crate::{Shutdown, DEFAULT_RESTART_DELAY, DEFAULT_RETRY_LIMIT, DEFAULT_SHUTDOWN_GRACE};

#[async_trait]
/// A long-running unit of work managed by the [`Supervisor`].
pub trait Runner<E: std::error::Error>: std::fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Run until `shutdown` fires. Returning an error, or panicking, makes the supervisor
    /// stop the sibling runners and relaunch the whole set.
    async fn run(&self, shutdown: Shutdown) -> StreamResult<(), E>;
}

/// Runs a set of runners concurrently, relaunching all of them when any one fails,
/// up to `retry_limit` times.
#[derive(Debug)]
pub struct Supervisor<E> {
    runners: Vec<Arc<dyn Runner<E>>>,
    retry_limit: u32,
    shutdown_grace: Duration,
    restart_delay: Duration,
}

type RunnerResult<E> = Result<StreamResult<(), E>, JoinError>;

/// A spawned runner, remembering which one it is.
struct RunnerTask<E: std::error::Error> {
    index: usize,
    handle: Pin<Box<TaskHandle<StreamResult<(), E>>>>,
}

impl<E: std::error::Error> Future for RunnerTask<E> {
    type Output = (usize, RunnerResult<E>);

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let index = self.index;
        match self.handle.as_mut().poll(cx) {
            Poll::Ready(res) => Poll::Ready((index, res)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<E> Default for Supervisor<E> {
    fn default() -> Self {
        Self {
            runners: Vec::new(),
            retry_limit: DEFAULT_RETRY_LIMIT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            restart_delay: DEFAULT_RESTART_DELAY,
        }
    }
}

impl<E: std::error::Error + Send + Sync + 'static> Supervisor<E> {
    pub fn new(retry_limit: u32, shutdown_grace: Duration) -> Self {
        Self {
            retry_limit,
            shutdown_grace,
            ..Default::default()
        }
    }

    pub fn add_runner(&mut self, runner: Arc<dyn Runner<E>>) -> &mut Self {
        self.runners.push(runner);
        self
    }

    pub fn set_restart_delay(&mut self, delay: Duration) -> &mut Self {
        self.restart_delay = delay;
        self
    }

    pub fn runners(&self) -> impl Iterator<Item = &str> {
        self.runners.iter().map(|r| r.name())
    }

    /// Supervise until every runner returns, `shutdown` fires, or the retries are exhausted.
    pub async fn run(&self, shutdown: Shutdown) -> StreamResult<(), E> {
        if self.runners.is_empty() {
            return Err(StreamErr::Config("no runners to supervise".to_owned()));
        }
        let mut retries = 0;
        loop {
            let failure = self.run_once(&shutdown).await;
            let reason = match failure {
                None => {
                    if shutdown.is_triggered() {
                        log::info!("Supervisor stopped on shutdown");
                    } else {
                        log::info!("All runners finished");
                    }
                    return Ok(());
                }
                Some(reason) => reason,
            };
            if shutdown.is_triggered() {
                log::warn!("{reason} while shutting down");
                return Ok(());
            }
            retries += 1;
            if retries > self.retry_limit {
                log::error!("{reason}; giving up after {} restarts", self.retry_limit);
                return Err(StreamErr::RetryExhausted {
                    retries: self.retry_limit,
                    last: reason,
                });
            }
            log::warn!("{reason}; restarting ({retries}/{})", self.retry_limit);
            if shutdown
                .run_until(sleep(self.restart_delay * retries))
                .await
                .is_none()
            {
                return Ok(());
            }
        }
    }

    /// Launch every runner and wait for them. Returns the first failure.
    async fn run_once(&self, shutdown: &Shutdown) -> Option<String> {
        let (mut stop, child) = shutdown.child();
        let mut running: FuturesUnordered<RunnerTask<E>> = self
            .runners
            .iter()
            .enumerate()
            .map(|(index, runner)| {
                let runner = runner.clone();
                let shutdown = child.clone();
                RunnerTask {
                    index,
                    handle: Box::pin(spawn_task(async move { runner.run(shutdown).await })),
                }
            })
            .collect();

        let mut failure = None;
        while let Some((index, res)) = running.next().await {
            if let Some(reason) = self.outcome(index, res) {
                failure = Some(reason);
                break;
            }
        }
        stop.trigger();

        if !running.is_empty() {
            let grace = self.shutdown_grace;
            let stopped = timeout(grace, async {
                while let Some((index, res)) = running.next().await {
                    self.outcome(index, res);
                }
            })
            .await;
            if stopped.is_err() {
                for task in running.iter() {
                    log::warn!(
                        "Runner {} did not stop within {grace:?}; aborting",
                        self.runners[task.index].name()
                    );
                    abort_task(&task.handle);
                }
            }
        }
        failure
    }

    fn outcome(&self, index: usize, res: RunnerResult<E>) -> Option<String> {
        let name = self.runners[index].name();
        match res {
            Ok(Ok(())) => {
                log::debug!("Runner {name} finished");
                None
            }
            Ok(Err(err)) => {
                log::error!("Runner {name} failed: {err}");
                Some(format!("runner {name} failed: {err}"))
            }
            Err(err) => {
                log::error!("Runner {name} panicked: {err}");
                Some(format!("runner {name} panicked: {err}"))
            }
        }
    }
}

impl<E: std::error::Error> std::fmt::Debug for RunnerTask<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunnerTask")
            .field("index", &self.index)
            .finish()
    }
}
