use std::time::Duration;

use logrelay_types::{
    AutoStreamReset, ConsumerGroup, ConsumerId, StreamErr, StreamKey, StreamResult,
};

pub const DEFAULT_STREAM_KEY: &str = "logs";
pub const DEFAULT_GROUP: &str = "logrelay";
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_millis(5000);
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_millis(30000);
pub const DEFAULT_RETRY_LIMIT: u32 = 3;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_RETENTION_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RESTART_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
/// Options of one engine, which serves exactly one stream key.
pub struct EngineOptions {
    stream_key: StreamKey,
    group: ConsumerGroup,
    consumer_id: ConsumerId,
    batch_size: usize,
    idle_threshold: Duration,
    health_check_interval: Duration,
    retry_limit: u32,
    restart_delay: Duration,
    concurrency_limit: Option<usize>,
    auto_stream_reset: AutoStreamReset,
    shutdown_grace: Duration,
    retention: Option<Duration>,
    retention_check_interval: Duration,
}

impl EngineOptions {
    /// Defaults for everything but the stream key.
    /// The group is named after the running program, the consumer after the host.
    pub fn new(stream_key: StreamKey) -> Self {
        Self {
            stream_key,
            group: ConsumerGroup::new(program_name()),
            consumer_id: ConsumerId::host_default(),
            batch_size: DEFAULT_BATCH_SIZE,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
            retry_limit: DEFAULT_RETRY_LIMIT,
            restart_delay: DEFAULT_RESTART_DELAY,
            concurrency_limit: None,
            auto_stream_reset: AutoStreamReset::Latest,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            retention: None,
            retention_check_interval: DEFAULT_RETENTION_CHECK_INTERVAL,
        }
    }

    pub fn stream_key(&self) -> &StreamKey {
        &self.stream_key
    }
    pub fn set_stream_key(&mut self, key: StreamKey) -> &mut Self {
        self.stream_key = key;
        self
    }

    pub fn group(&self) -> &ConsumerGroup {
        &self.group
    }
    pub fn set_group(&mut self, group: ConsumerGroup) -> &mut Self {
        self.group = group;
        self
    }

    pub fn consumer_id(&self) -> &ConsumerId {
        &self.consumer_id
    }
    pub fn set_consumer_id(&mut self, id: ConsumerId) -> &mut Self {
        self.consumer_id = id;
        self
    }

    /// Maximum number of records per read, per claim page and per delivery.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
    pub fn set_batch_size(&mut self, size: usize) -> &mut Self {
        self.batch_size = size;
        self
    }

    /// How long a pending entry must sit unacknowledged before it may be claimed,
    /// and how long a consumer must be silent before it may be evicted.
    /// Also the reclaim scan interval.
    pub fn idle_threshold(&self) -> Duration {
        self.idle_threshold
    }
    pub fn set_idle_threshold(&mut self, threshold: Duration) -> &mut Self {
        self.idle_threshold = threshold;
        self
    }

    pub fn health_check_interval(&self) -> Duration {
        self.health_check_interval
    }
    pub fn set_health_check_interval(&mut self, interval: Duration) -> &mut Self {
        self.health_check_interval = interval;
        self
    }

    /// How many times the supervisor relaunches the runners before giving up.
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }
    pub fn set_retry_limit(&mut self, limit: u32) -> &mut Self {
        self.retry_limit = limit;
        self
    }

    /// Pause before each relaunch, multiplied by the retry count.
    pub fn restart_delay(&self) -> Duration {
        self.restart_delay
    }
    pub fn set_restart_delay(&mut self, delay: Duration) -> &mut Self {
        self.restart_delay = delay;
        self
    }

    /// Maximum number of concurrent drains across all stream keys sharing a limiter.
    /// `None` is unbounded. Per key it is always one.
    pub fn concurrency_limit(&self) -> Option<usize> {
        self.concurrency_limit
    }
    pub fn set_concurrency_limit(&mut self, limit: Option<usize>) -> &mut Self {
        self.concurrency_limit = limit;
        self
    }

    pub fn auto_stream_reset(&self) -> AutoStreamReset {
        self.auto_stream_reset
    }
    pub fn set_auto_stream_reset(&mut self, reset: AutoStreamReset) -> &mut Self {
        self.auto_stream_reset = reset;
        self
    }

    /// How long to wait for in-flight work on shutdown before aborting it.
    pub fn shutdown_grace(&self) -> Duration {
        self.shutdown_grace
    }
    pub fn set_shutdown_grace(&mut self, grace: Duration) -> &mut Self {
        self.shutdown_grace = grace;
        self
    }

    /// Entries older than this many days (rounded down to UTC midnight) are trimmed.
    /// `None` disables retention.
    pub fn retention(&self) -> Option<Duration> {
        self.retention
    }
    pub fn set_retention(&mut self, retention: Option<Duration>) -> &mut Self {
        self.retention = retention;
        self
    }

    pub fn retention_check_interval(&self) -> Duration {
        self.retention_check_interval
    }
    pub fn set_retention_check_interval(&mut self, interval: Duration) -> &mut Self {
        self.retention_check_interval = interval;
        self
    }

    pub fn validate<E: std::error::Error>(&self) -> StreamResult<(), E> {
        let err = |msg: &str| Err(StreamErr::Config(msg.to_owned()));
        if self.group.name().is_empty() {
            return err("group must not be empty");
        }
        if self.consumer_id.id().is_empty() {
            return err("consumer id must not be empty");
        }
        if self.batch_size == 0 {
            return err("batch_size must be greater than 0");
        }
        if self.idle_threshold.is_zero() {
            return err("idle_threshold must be greater than 0");
        }
        if self.health_check_interval.is_zero() {
            return err("health_check_interval must be greater than 0");
        }
        if self.concurrency_limit == Some(0) {
            return err("concurrency_limit must be greater than 0");
        }
        if matches!(self.retention, Some(r) if r.is_zero()) {
            return err("retention must be greater than 0");
        }
        if self.retention.is_some() && self.retention_check_interval.is_zero() {
            return err("retention_check_interval must be greater than 0");
        }
        Ok(())
    }
}

/// The file stem of the running executable.
pub fn program_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_GROUP.to_owned())
}

#[cfg(test)]
mod test {
    use super::*;

    type Result = StreamResult<(), std::io::Error>;

    #[test]
    fn test_defaults() {
        let options = EngineOptions::new(StreamKey::new(DEFAULT_STREAM_KEY).unwrap());
        assert_eq!(options.batch_size(), 100);
        assert_eq!(options.idle_threshold(), Duration::from_secs(5));
        assert_eq!(options.health_check_interval(), Duration::from_secs(30));
        assert_eq!(options.auto_stream_reset(), AutoStreamReset::Latest);
        assert_eq!(options.concurrency_limit(), None);
        assert!(!options.group().name().is_empty());
        assert!(!options.consumer_id().id().is_empty());
        let res: Result = options.validate();
        assert!(res.is_ok());
    }

    #[test]
    fn test_validate() {
        let mut options = EngineOptions::new(StreamKey::new(DEFAULT_STREAM_KEY).unwrap());
        options.set_batch_size(0);
        let res: Result = options.validate();
        assert!(matches!(res, Err(StreamErr::Config(_))));

        options.set_batch_size(10).set_idle_threshold(Duration::ZERO);
        let res: Result = options.validate();
        assert!(matches!(res, Err(StreamErr::Config(_))));

        options
            .set_idle_threshold(Duration::from_millis(1))
            .set_concurrency_limit(Some(0));
        let res: Result = options.validate();
        assert!(matches!(res, Err(StreamErr::Config(_))));

        options.set_concurrency_limit(Some(4)).set_group(ConsumerGroup::new(""));
        let res: Result = options.validate();
        assert!(matches!(res, Err(StreamErr::Config(_))));

        options
            .set_group(ConsumerGroup::new("g"))
            .set_retention(Some(Duration::ZERO));
        let res: Result = options.validate();
        assert!(matches!(res, Err(StreamErr::Config(_))));

        options.set_retention(Some(Duration::from_secs(86400 * 7)));
        let res: Result = options.validate();
        assert!(res.is_ok());
    }
}
