use std::{sync::Arc, time::Duration};

use logrelay_runtime::sleep;
use logrelay_types::{export::async_trait, StreamResult, StreamStore};

use crate::{Runner, Shutdown};

/// Periodically pings the store. Only ever logs; never fails.
#[derive(Debug)]
pub struct HealthProbe<S> {
    store: Arc<S>,
    interval: Duration,
}

impl<S: StreamStore> HealthProbe<S> {
    pub fn new(store: Arc<S>, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Ping once. Returns whether the store answered.
    pub async fn probe(&self) -> bool {
        match self.store.ping().await {
            Ok(reply) => {
                log::debug!("Health check: {reply}");
                true
            }
            Err(err) => {
                log::warn!("Health check failed: {err}");
                false
            }
        }
    }
}

#[async_trait]
impl<S: StreamStore + 'static> Runner<S::Error> for HealthProbe<S> {
    fn name(&self) -> &str {
        "health-probe"
    }

    async fn run(&self, shutdown: Shutdown) -> StreamResult<(), S::Error> {
        loop {
            if shutdown.run_until(self.probe()).await.is_none() {
                break;
            }
            if shutdown.run_until(sleep(self.interval)).await.is_none() {
                break;
            }
        }
        Ok(())
    }
}
