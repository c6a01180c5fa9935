use std::{sync::Arc, time::Duration};

use logrelay_runtime::sleep;
use logrelay_types::{
    export::{async_trait, time::Time},
    timestamp_to_millis, RecordId, StreamResult, StreamStore, Timestamp,
};

use crate::{EngineOptions, Runner, Shutdown};

/// Trims the stream of entries older than the retention period, once per day boundary.
///
/// Trimming does not consult the Pending Entry List: an entry that was never delivered
/// is removed all the same once it falls out of the retention window.
#[derive(Debug)]
pub struct RetentionSweeper<S> {
    store: Arc<S>,
    options: Arc<EngineOptions>,
    retention: Duration,
}

/// Midnight (UTC) of the day `retention` before `now`. Entries before it are expired.
pub fn retention_cutoff(now: Timestamp, retention: Duration) -> Timestamp {
    (now - retention).replace_time(Time::MIDNIGHT)
}

impl<S: StreamStore> RetentionSweeper<S> {
    pub fn new(store: Arc<S>, options: Arc<EngineOptions>, retention: Duration) -> Self {
        Self {
            store,
            options,
            retention,
        }
    }

    /// Trim everything before the cutoff. Returns the number of entries removed.
    pub async fn trim(&self, cutoff: Timestamp) -> StreamResult<u64, S::Error> {
        let stream = self.options.stream_key();
        let millis = timestamp_to_millis(&cutoff).max(0) as u64;
        let removed = self
            .store
            .trim_before(stream, RecordId::from_millis(millis))
            .await?;
        if removed > 0 {
            log::info!("Removed {removed} entries of stream {stream} older than {cutoff}");
        } else {
            log::debug!("No entries of stream {stream} older than {cutoff}");
        }
        Ok(removed)
    }
}

#[async_trait]
impl<S: StreamStore + 'static> Runner<S::Error> for RetentionSweeper<S> {
    fn name(&self) -> &str {
        "retention-sweeper"
    }

    async fn run(&self, shutdown: Shutdown) -> StreamResult<(), S::Error> {
        let mut last: Option<Timestamp> = None;
        loop {
            let cutoff = retention_cutoff(Timestamp::now_utc(), self.retention);
            if last.map_or(true, |last| last < cutoff) {
                match shutdown.run_until(self.trim(cutoff)).await {
                    None => break,
                    Some(Ok(_)) => last = Some(cutoff),
                    Some(Err(err)) => log::error!(
                        "Failed to trim stream {}: {err}",
                        self.options.stream_key()
                    ),
                }
            }
            let interval = self.options.retention_check_interval();
            if shutdown.run_until(sleep(interval)).await.is_none() {
                break;
            }
        }
        Ok(())
    }
}
