use std::sync::Arc;

use logrelay_types::{DeliveryPort, StreamResult, StreamStore};

use crate::{
    ActiveConsumer, ConcurrencyLimiter, EngineOptions, GroupManager, HealthProbe, ReclaimScanner,
    RetentionSweeper, Shutdown, Supervisor, Trigger,
};

/// Wires the store, the Delivery Port and the options of one stream key into a supervised set of runners.
#[derive(Debug)]
pub struct Engine<S> {
    store: Arc<S>,
    port: Arc<dyn DeliveryPort>,
    options: Arc<EngineOptions>,
    limiter: ConcurrencyLimiter,
    sweeping: ConcurrencyLimiter,
}

impl<S: StreamStore + 'static> Engine<S> {
    pub fn new(
        store: Arc<S>,
        port: Arc<dyn DeliveryPort>,
        options: EngineOptions,
    ) -> StreamResult<Self, S::Error> {
        options.validate::<S::Error>()?;
        let limiter = ConcurrencyLimiter::new(1, options.concurrency_limit());
        Ok(Self {
            store,
            port,
            options: Arc::new(options),
            limiter,
            sweeping: ConcurrencyLimiter::single_flight(),
        })
    }

    /// Share drain and sweep slots with other engines of the same process,
    /// so that `concurrency_limit` bounds all of them together.
    pub fn share_limiters(mut self, other: &Engine<S>) -> Self {
        self.limiter = other.limiter.clone();
        self.sweeping = other.sweeping.clone();
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn group_manager(&self) -> GroupManager<S> {
        GroupManager::new(self.store.clone())
    }

    /// Create the group and register the consumer. Any failure here is fatal.
    pub async fn bootstrap(&self) -> StreamResult<(), S::Error> {
        self.group_manager()
            .bootstrap(
                self.options.stream_key(),
                self.options.group(),
                self.options.consumer_id(),
                self.options.auto_stream_reset(),
            )
            .await
    }

    pub fn active_consumer(&self, trigger: Box<dyn Trigger>) -> ActiveConsumer<S> {
        ActiveConsumer::new(
            self.store.clone(),
            self.port.clone(),
            self.options.clone(),
            self.limiter.clone(),
            trigger,
        )
    }

    pub fn reclaim_scanner(&self) -> ReclaimScanner<S> {
        ReclaimScanner::with_sweep_limiter(
            self.store.clone(),
            self.port.clone(),
            self.options.clone(),
            self.sweeping.clone(),
        )
    }

    pub fn health_probe(&self) -> HealthProbe<S> {
        HealthProbe::new(self.store.clone(), self.options.health_check_interval())
    }

    pub fn retention_sweeper(&self) -> Option<RetentionSweeper<S>> {
        self.options.retention().map(|retention| {
            RetentionSweeper::new(self.store.clone(), self.options.clone(), retention)
        })
    }

    /// The full runner set under a supervisor.
    pub fn supervisor(&self, trigger: Box<dyn Trigger>) -> Supervisor<S::Error> {
        let mut supervisor =
            Supervisor::new(self.options.retry_limit(), self.options.shutdown_grace());
        supervisor
            .set_restart_delay(self.options.restart_delay())
            .add_runner(Arc::new(self.active_consumer(trigger)))
            .add_runner(Arc::new(self.reclaim_scanner()))
            .add_runner(Arc::new(self.health_probe()));
        if let Some(sweeper) = self.retention_sweeper() {
            supervisor.add_runner(Arc::new(sweeper));
        }
        supervisor
    }

    /// Bootstrap, then run everything until `shutdown` fires or the supervisor gives up.
    pub async fn run(
        &self,
        trigger: Box<dyn Trigger>,
        shutdown: Shutdown,
    ) -> StreamResult<(), S::Error> {
        self.bootstrap().await?;
        log::info!(
            "Relaying stream {} as consumer {} of group {}",
            self.options.stream_key(),
            self.options.consumer_id(),
            self.options.group()
        );
        self.supervisor(trigger).run(shutdown).await
    }
}
