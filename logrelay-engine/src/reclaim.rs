use std::sync::Arc;

use logrelay_runtime::sleep;
use logrelay_types::{
    export::async_trait, ConsumerId, DeliveryPort, IdBound, RecordId, StreamErr, StreamResult,
    StreamStore,
};

use crate::{
    delivery::{deliver_and_ack, IdRange},
    task::TaskSet,
    ConcurrencyLimiter, EngineOptions, GroupManager, Runner, Shutdown,
};

/// Claims entries that have sat unacknowledged in the Pending Entry List for longer than the
/// idle threshold, delivers them again, then evicts consumer identities that went silent.
#[derive(Debug)]
pub struct ReclaimScanner<S> {
    inner: Arc<ScannerInner<S>>,
}

#[derive(Debug)]
struct ScannerInner<S> {
    store: Arc<S>,
    port: Arc<dyn DeliveryPort>,
    groups: GroupManager<S>,
    options: Arc<EngineOptions>,
    /// One sweep per stream key at a time
    sweeping: ConcurrencyLimiter,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
/// What one sweep did.
pub struct SweepReport {
    /// Pages of the Pending Entry List visited.
    pub pages: usize,
    pub claimed: usize,
    pub delivered: usize,
    pub acked: u64,
    pub evicted: usize,
}

impl<S: StreamStore + 'static> ReclaimScanner<S> {
    pub fn new(store: Arc<S>, port: Arc<dyn DeliveryPort>, options: Arc<EngineOptions>) -> Self {
        Self::with_sweep_limiter(store, port, options, ConcurrencyLimiter::single_flight())
    }

    /// Share the sweep slots with other scanners of the same process.
    pub fn with_sweep_limiter(
        store: Arc<S>,
        port: Arc<dyn DeliveryPort>,
        options: Arc<EngineOptions>,
        sweeping: ConcurrencyLimiter,
    ) -> Self {
        Self {
            inner: Arc::new(ScannerInner {
                groups: GroupManager::new(store.clone()),
                store,
                port,
                options,
                sweeping,
            }),
        }
    }

    /// Run one sweep in the calling task.
    /// Returns `None` if a sweep of the same stream key is already in progress.
    pub async fn sweep(&self, shutdown: &Shutdown) -> StreamResult<Option<SweepReport>, S::Error> {
        let key = self.inner.options.stream_key();
        let _permit = match self.inner.sweeping.try_acquire(key) {
            Some(permit) => permit,
            None => {
                log::debug!("Sweep of stream {key} in progress; skipped");
                return Ok(None);
            }
        };
        self.inner.sweep(shutdown).await.map(Some)
    }
}

impl<S: StreamStore + 'static> ScannerInner<S> {
    async fn sweep(&self, shutdown: &Shutdown) -> StreamResult<SweepReport, S::Error> {
        let (stream, group, consumer) = (
            self.options.stream_key(),
            self.options.group(),
            self.options.consumer_id(),
        );
        let threshold = self.options.idle_threshold();
        let mut report = SweepReport::default();
        let mut cursor = IdBound::Minus;

        loop {
            if shutdown.is_triggered() {
                return Ok(report);
            }
            let page = self
                .store
                .pending(stream, group, cursor, self.options.batch_size())
                .await?;
            report.pages += 1;
            let idle: Vec<RecordId> = page
                .iter()
                .filter(|entry| entry.idle > threshold)
                .map(|entry| entry.id)
                .collect();
            let last = match idle.last() {
                Some(last) => *last,
                None => break,
            };
            cursor = IdBound::Exclusive(last);

            let records = self
                .store
                .claim(stream, group, consumer, threshold, &idle)
                .await?;
            if records.len() < idle.len() {
                log::debug!(
                    "Claimed {} of {} idle entries of stream {stream}; the rest were taken or deleted",
                    records.len(),
                    idle.len()
                );
            }
            if records.is_empty() {
                continue;
            }
            report.claimed += records.len();
            log::info!(
                "Claimed {} idle entries {} of stream {stream} group {group} for {consumer}",
                records.len(),
                IdRange(&records)
            );
            if shutdown.is_triggered() {
                // still ours, will be claimed again once idle
                return Ok(report);
            }

            let batch =
                deliver_and_ack(self.store.as_ref(), self.port.as_ref(), stream, group, &records)
                    .await?;
            report.delivered += batch.submitted;
            report.acked += batch.acked;
            if batch.port_failed {
                break;
            }
        }

        report.evicted = self.evict(consumer).await?;
        Ok(report)
    }

    /// Remove consumer identities, other than ours, that have been silent for longer than the
    /// idle threshold and own no pending entries.
    async fn evict(&self, local: &ConsumerId) -> StreamResult<usize, S::Error> {
        let (stream, group) = (self.options.stream_key(), self.options.group());
        let threshold = self.options.idle_threshold();
        let mut evicted = 0;
        for info in self.store.consumers(stream, group).await? {
            if info.name == local.id() || info.idle <= threshold {
                continue;
            }
            if info.pending > 0 {
                log::debug!(
                    "Consumer {} of group {group} is idle but still owns {} entries; kept",
                    info.name,
                    info.pending
                );
                continue;
            }
            let pending = self
                .store
                .delete_consumer(stream, group, &ConsumerId::new(info.name.as_str()))
                .await?;
            if pending > 0 {
                log::warn!(
                    "Consumer {} of group {group} took {pending} entries with it",
                    info.name
                );
            }
            log::info!(
                "Evicted consumer {} of group {group} on stream {stream}, idle for {:?}",
                info.name,
                info.idle
            );
            evicted += 1;
        }
        Ok(evicted)
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

    /// One scheduled tick: make sure we are registered, then sweep.
    async fn tick(&self, shutdown: &Shutdown) {
        let stream = self.options.stream_key();
        if let Err(err) = self.bootstrap().await {
            log::error!("Failed to register for reclaim on stream {stream}: {err}");
            return;
        }
        match self.sweep(shutdown).await {
            Ok(report) => {
                if report.claimed > 0 || report.evicted > 0 {
                    log::info!(
                        "Sweep of stream {stream}: {} claimed, {} acked, {} consumers evicted",
                        report.claimed,
                        report.acked,
                        report.evicted
                    );
                }
            }
            Err(StreamErr::GroupNotFound { .. }) => {
                log::warn!("Group vanished from stream {stream} during sweep");
            }
            Err(err) => {
                log::error!("Sweep of stream {stream} failed: {err}");
            }
        }
    }
}

#[async_trait]
impl<S: StreamStore + 'static> Runner<S::Error> for ReclaimScanner<S> {
    fn name(&self) -> &str {
        "reclaim-scanner"
    }

    async fn run(&self, shutdown: Shutdown) -> StreamResult<(), S::Error> {
        self.inner.bootstrap().await?;
        let key = self.inner.options.stream_key();
        let interval = self.inner.options.idle_threshold();
        let mut tasks = TaskSet::new();
        log::info!("Reclaiming idle entries of stream {key} every {interval:?}");

        loop {
            if shutdown.run_until(sleep(interval)).await.is_none() {
                break;
            }
            match self.inner.sweeping.try_acquire(key) {
                Some(permit) => {
                    let inner = self.inner.clone();
                    let shutdown = shutdown.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        inner.tick(&shutdown).await;
                    });
                }
                None => log::debug!("Sweep of stream {key} still running; tick skipped"),
            }
        }

        let aborted = tasks.shutdown(self.inner.options.shutdown_grace()).await;
        if aborted > 0 {
            log::warn!("Aborted a sweep of stream {key} after the shutdown grace");
        }
        Ok(())
    }
}
