use std::sync::Arc;

use flume::Receiver;
use logrelay_runtime::AsyncMutex;
use logrelay_types::{
    export::{
        async_trait,
        futures::{
            future::{select, Either},
            pin_mut,
        },
    },
    DeliveryPort, ReadBatch, StreamErr, StreamResult, StreamStore,
};

use crate::{
    delivery::deliver_and_ack, task::TaskSet, ConcurrencyLimiter, EngineOptions, GroupManager,
    Permit, Runner, Shutdown, Trigger,
};

/// Pulls never-delivered records of one stream key in batches, hands them to the
/// Delivery Port and acknowledges what the port confirms, until the stream is drained.
///
/// As a [`Runner`], it starts a drain for every wake-up of its [`Trigger`],
/// unless a drain of the same stream key is already running. A wake-up turned away
/// by the global bound of the limiter is retried when a slot frees up.
#[derive(Debug)]
pub struct ActiveConsumer<S> {
    inner: Arc<ConsumerInner<S>>,
    trigger: AsyncMutex<Box<dyn Trigger>>,
}

#[derive(Debug)]
struct ConsumerInner<S> {
    store: Arc<S>,
    port: Arc<dyn DeliveryPort>,
    groups: GroupManager<S>,
    options: Arc<EngineOptions>,
    limiter: ConcurrencyLimiter,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// What one drain did.
pub struct DrainReport {
    /// Number of reads, including the final empty one.
    /// A read of nothing but malformed entries counts, and does not end the drain.
    pub reads: usize,
    pub delivered: usize,
    pub acked: u64,
    /// The drain stopped early: the port failed, or shutdown was requested.
    pub interrupted: bool,
}

impl<S: StreamStore + 'static> ActiveConsumer<S> {
    pub fn new(
        store: Arc<S>,
        port: Arc<dyn DeliveryPort>,
        options: Arc<EngineOptions>,
        limiter: ConcurrencyLimiter,
        trigger: Box<dyn Trigger>,
    ) -> Self {
        Self {
            inner: Arc::new(ConsumerInner {
                groups: GroupManager::new(store.clone()),
                store,
                port,
                options,
                limiter,
            }),
            trigger: AsyncMutex::new(trigger),
        }
    }

    /// Drain the stream once, in the calling task. Does not consult the limiter.
    pub async fn drain(&self, shutdown: &Shutdown) -> StreamResult<DrainReport, S::Error> {
        self.inner.drain(shutdown).await
    }

    /// Handle one wake-up: start a drain in the background if the limiter allows.
    /// Returns false if the wake-up was absorbed by a drain already in progress.
    fn wake(&self, tasks: &mut TaskSet, shutdown: &Shutdown) -> bool {
        let key = self.inner.options.stream_key();
        self.inner.limiter.notify(key);
        match self.inner.limiter.try_acquire(key) {
            Some(permit) => {
                let inner = self.inner.clone();
                let shutdown = shutdown.clone();
                tasks.spawn(async move { inner.drain_while_notified(permit, shutdown).await });
                true
            }
            None => {
                log::trace!("Drain of stream {key} in progress; wake-up absorbed");
                false
            }
        }
    }
}

impl<S: StreamStore + 'static> ConsumerInner<S> {
    /// Keep draining for as long as wake-ups keep arriving.
    async fn drain_while_notified(&self, mut permit: Permit, shutdown: Shutdown) {
        loop {
            permit.take_notified();
            match self.drain(&shutdown).await {
                Ok(report) => {
                    if report.delivered > 0 {
                        log::debug!(
                            "Drained stream {}: {} delivered, {} acked in {} reads",
                            self.options.stream_key(),
                            report.delivered,
                            report.acked,
                            report.reads
                        );
                    }
                }
                Err(err) => {
                    log::error!(
                        "Drain of stream {} group {} consumer {} failed: {err}",
                        self.options.stream_key(),
                        self.options.group(),
                        self.options.consumer_id()
                    );
                }
            }
            let key = permit.key().clone();
            drop(permit);
            if shutdown.is_triggered() || !self.limiter.is_notified(&key) {
                break;
            }
            // a wake-up arrived after our last read
            permit = match self.limiter.try_acquire(&key) {
                Some(permit) => permit,
                None => break,
            };
        }
    }

    async fn drain(&self, shutdown: &Shutdown) -> StreamResult<DrainReport, S::Error> {
        let stream = self.options.stream_key();
        let group = self.options.group();
        let mut report = DrainReport::default();
        loop {
            if shutdown.is_triggered() {
                report.interrupted = true;
                break;
            }
            let batch = self.read().await?;
            report.reads += 1;
            if batch.is_drained() {
                break;
            }
            let records = batch.records;
            if records.is_empty() {
                // nothing but malformed entries; they stay pending, the stream may not be drained
                continue;
            }
            if shutdown.is_triggered() {
                log::debug!(
                    "Shutdown requested; {} records of stream {stream} left pending",
                    records.len()
                );
                report.interrupted = true;
                break;
            }
            let batch =
                deliver_and_ack(self.store.as_ref(), self.port.as_ref(), stream, group, &records)
                    .await?;
            report.delivered += batch.submitted;
            report.acked += batch.acked;
            if batch.port_failed {
                // leave the rest of the stream to the next wake-up
                report.interrupted = true;
                break;
            }
        }
        Ok(report)
    }

    /// Read the next batch. A missing group is re-created once and the read retried.
    async fn read(&self) -> StreamResult<ReadBatch, S::Error> {
        let (stream, group, consumer) = (
            self.options.stream_key(),
            self.options.group(),
            self.options.consumer_id(),
        );
        let size = self.options.batch_size();
        match self.store.read_group(stream, group, consumer, size).await {
            Err(StreamErr::GroupNotFound { .. }) => {
                log::warn!("Group {group} vanished from stream {stream}; bootstrapping again");
                self.bootstrap().await?;
                self.store.read_group(stream, group, consumer, size).await
            }
            res => res,
        }
    }

    async fn bootstrap(&self) -> StreamResult<(), S::Error> {
        self.groups
            .bootstrap(
                self.options.stream_key(),
                self.options.group(),
                self.options.consumer_id(),
                self.options.auto_stream_reset(),
            )
            .await
    }
}

/// The next wake-up of the trigger, or of the limiter once a slot is free again.
async fn next_wake(trigger: &mut Box<dyn Trigger>, waker: &Receiver<()>) -> bool {
    let (fired, freed) = (trigger.wait(), waker.recv_async());
    pin_mut!(fired);
    pin_mut!(freed);
    match select(fired, freed).await {
        Either::Left((fired, _)) => fired,
        Either::Right((Ok(()), _)) => {
            log::trace!("A drain slot freed up");
            true
        }
        // the limiter is gone, only the trigger is left
        Either::Right((Err(_), fired)) => fired.await,
    }
}

#[async_trait]
impl<S: StreamStore + 'static> Runner<S::Error> for ActiveConsumer<S> {
    fn name(&self) -> &str {
        "active-consumer"
    }

    async fn run(&self, shutdown: Shutdown) -> StreamResult<(), S::Error> {
        self.inner.bootstrap().await?;
        let stream = self.inner.options.stream_key();
        let mut trigger = self.trigger.lock().await;
        let waker = self.inner.limiter.waker(stream);
        let mut tasks = TaskSet::new();
        log::info!(
            "Consuming stream {stream} as {} in group {}",
            self.inner.options.consumer_id(),
            self.inner.options.group()
        );

        let closed = loop {
            match shutdown.run_until(next_wake(&mut trigger, &waker)).await {
                None => break false,
                Some(false) => break true,
                Some(true) => {
                    self.wake(&mut tasks, &shutdown);
                }
            }
        };

        let aborted = tasks.shutdown(self.inner.options.shutdown_grace()).await;
        if aborted > 0 {
            log::warn!("Aborted {aborted} drains of stream {stream} after the shutdown grace");
        }
        if closed && !shutdown.is_triggered() {
            return Err(StreamErr::Runtime(
                format!("trigger of stream {stream} closed").into(),
            ));
        }
        Ok(())
    }
}
