use std::time::Duration;

use crate::{DEFAULT_MAX_LEN, DEFAULT_NOTIFICATION_CHANNEL};
use logrelay_types::StoreUrl;

/// The default threshold above which a command is logged as slow
pub const DEFAULT_SLOW_COMMAND_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct RedisConnectOptions {
    db: u32,
    username: Option<String>,
    password: Option<String>,
    timeout: Option<Duration>,
    disable_hostname_verification: bool,
    slow_command_threshold: Option<Duration>,
}

#[derive(Debug, Clone)]
/// Options for Producers.
pub struct RedisProducerOptions {
    max_len: Option<usize>,
    notification_channel: Option<String>,
}

impl Default for RedisConnectOptions {
    fn default() -> Self {
        Self {
            db: 0,
            username: None,
            password: None,
            timeout: None,
            disable_hostname_verification: false,
            slow_command_threshold: Some(DEFAULT_SLOW_COMMAND_THRESHOLD),
        }
    }
}

impl RedisConnectOptions {
    /// Take db, username and password from the connection string, where given.
    pub fn from_url(url: &StoreUrl) -> Self {
        let mut options = Self::default();
        options
            .set_db(url.db().unwrap_or_default())
            .set_username(url.username().map(|s| s.to_owned()))
            .set_password(url.password().map(|s| s.to_owned()));
        options
    }

    /// Defaults to 0.
    pub fn db(&self) -> u32 {
        self.db
    }
    pub fn set_db(&mut self, db: u32) -> &mut Self {
        self.db = db;
        self
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }
    pub fn set_username(&mut self, username: Option<String>) -> &mut Self {
        self.username = username;
        self
    }

    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
    pub fn set_password(&mut self, password: Option<String>) -> &mut Self {
        self.password = password;
        self
    }

    /// Timeout for establishing a connection. Defaults to [`crate::DEFAULT_TIMEOUT`] if unset.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn disable_hostname_verification(&self) -> bool {
        self.disable_hostname_verification
    }
    /// # Warning
    ///
    /// Only relevant if TLS is enabled and connecting to `rediss://`.
    /// Trust self-signed certificates. This is insecure. Do not use in production.
    pub fn set_disable_hostname_verification(&mut self, bool: bool) -> &mut Self {
        self.disable_hostname_verification = bool;
        self
    }

    /// Commands taking longer than this are logged as warnings. `None` disables the check.
    pub fn slow_command_threshold(&self) -> Option<Duration> {
        self.slow_command_threshold
    }
    pub fn set_slow_command_threshold(&mut self, threshold: Option<Duration>) -> &mut Self {
        self.slow_command_threshold = threshold;
        self
    }
}

impl Default for RedisProducerOptions {
    fn default() -> Self {
        Self {
            max_len: Some(DEFAULT_MAX_LEN),
            notification_channel: Some(DEFAULT_NOTIFICATION_CHANNEL.to_owned()),
        }
    }
}

impl RedisProducerOptions {
    /// Approximate cap on the stream length (`XADD .. MAXLEN ~ n`). `None` means unbounded.
    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }
    pub fn set_max_len(&mut self, max_len: Option<usize>) -> &mut Self {
        self.max_len = max_len;
        self
    }

    /// Channel to `PUBLISH` on after every batch of appends. `None` disables notifications.
    pub fn notification_channel(&self) -> Option<&str> {
        self.notification_channel.as_deref()
    }
    pub fn set_notification_channel(&mut self, channel: Option<String>) -> &mut Self {
        self.notification_channel = channel;
        self
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_options_from_url() {
        let url: StoreUrl = "redis://bob:pw@localhost:6379/3".parse().unwrap();
        let options = RedisConnectOptions::from_url(&url);
        assert_eq!(options.db(), 3);
        assert_eq!(options.username(), Some("bob"));
        assert_eq!(options.password(), Some("pw"));
        assert_eq!(
            options.slow_command_threshold(),
            Some(DEFAULT_SLOW_COMMAND_THRESHOLD)
        );

        let options = RedisConnectOptions::from_url(&"localhost".parse().unwrap());
        assert_eq!(options.db(), 0);
        assert_eq!(options.username(), None);
    }

    #[test]
    fn test_producer_options() {
        let mut options = RedisProducerOptions::default();
        assert_eq!(options.max_len(), Some(65535));
        assert_eq!(options.notification_channel(), Some("logrelay"));
        options.set_max_len(None).set_notification_channel(None);
        assert_eq!(options.max_len(), None);
        assert_eq!(options.notification_channel(), None);
    }
}
