use std::{fmt::Debug, sync::Arc, time::Duration};

use crate::{map_err, RedisConnectOptions, RedisErr, RedisResult, DEFAULT_TIMEOUT, REDIS_PORT};
use logrelay_runtime::{sleep, timeout};
use logrelay_types::{StoreUrl, StreamErr};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};

/// Give up reconnecting once the backoff grows beyond this many seconds.
const MAX_BACKOFF_SECS: u32 = 60;

#[derive(Debug)]
/// A wrapped [`redis::aio::Connection`] that can auto-reconnect
pub struct Connection {
    url: StoreUrl,
    options: Arc<RedisConnectOptions>,
    state: State,
}

enum State {
    Alive(redis::aio::Connection),
    Reconnecting { delay: u32 },
    Dead,
}

impl Debug for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alive(_) => f.debug_tuple("Alive").finish(),
            Self::Reconnecting { delay } => f.debug_tuple("Reconnecting").field(delay).finish(),
            Self::Dead => f.debug_tuple("Dead").finish(),
        }
    }
}

impl Connection {
    /// Create a connection; return error if failed.
    pub async fn create(url: StoreUrl, options: Arc<RedisConnectOptions>) -> RedisResult<Self> {
        let conn = create_connection(&url, &options).await?;
        log::debug!("Opened connection to {url}");
        Ok(Self {
            url,
            options,
            state: State::Alive(conn),
        })
    }

    /// Create a connection; but retry later if failed.
    pub async fn create_or_reconnect(url: StoreUrl, options: Arc<RedisConnectOptions>) -> Self {
        let state = match create_connection(&url, &options).await {
            Ok(conn) => State::Alive(conn),
            Err(err) => {
                log::warn!("Failed to connect to {url}, will retry: {err}");
                State::Reconnecting { delay: 1 }
            }
        };
        Self {
            url,
            options,
            state,
        }
    }

    /// Drop the connection and reconnect *later*.
    pub fn reconnect(&mut self) {
        if !matches!(self.state, State::Reconnecting { .. }) {
            log::warn!("Lost connection to {}, reconnecting", self.url);
            self.state = State::Reconnecting { delay: 1 };
        }
    }

    /// Get a mutable connection, will wait and retry with backoff until dead.
    pub async fn get(&mut self) -> RedisResult<&mut redis::aio::Connection> {
        while let State::Reconnecting { delay } = self.state {
            sleep(Duration::from_secs(delay as u64)).await;
            match create_connection(&self.url, &self.options).await {
                Ok(conn) => {
                    log::info!("Reconnected to {}", self.url);
                    self.state = State::Alive(conn);
                }
                Err(err) => {
                    if delay > MAX_BACKOFF_SECS {
                        log::error!("Giving up reconnecting to {}: {err}", self.url);
                        self.state = State::Dead;
                    } else {
                        log::debug!("Reconnecting to {} failed: {err}", self.url);
                        self.state = State::Reconnecting { delay: delay * 2 };
                    }
                }
            }
        }
        self.try_get()
    }

    /// Get a mutable connection, only if it is alive.
    pub fn try_get(&mut self) -> RedisResult<&mut redis::aio::Connection> {
        match &mut self.state {
            State::Alive(conn) => Ok(conn),
            State::Dead => Err(StreamErr::Connect(format!(
                "Connection to {} is dead.",
                self.url
            ))),
            State::Reconnecting { .. } => Err(StreamErr::Backend(RedisErr::TryAgain(format!(
                "Reconnecting to {}",
                self.url
            )))),
        }
    }
}

pub(crate) async fn create_connection(
    url: &StoreUrl,
    options: &RedisConnectOptions,
) -> RedisResult<redis::aio::Connection> {
    let host = url.host();
    if host.is_empty() {
        return Err(StreamErr::Connect("Host empty".to_owned()));
    }
    let host = host.to_owned();
    let port = url.port().unwrap_or(REDIS_PORT);
    let conn = ConnectionInfo {
        addr: match url.protocol() {
            "redis" => ConnectionAddr::Tcp(host, port),
            "rediss" => ConnectionAddr::TcpTls {
                host,
                port,
                insecure: options.disable_hostname_verification(),
            },
            "" => return Err(StreamErr::Connect("protocol not set".to_owned())),
            protocol => return Err(StreamErr::Connect(format!("unknown protocol `{protocol}`"))),
        },
        redis: RedisConnectionInfo {
            db: options.db() as i64,
            username: options.username().map(|s| s.to_owned()),
            password: options.password().map(|s| s.to_owned()),
        },
    };
    let client = redis::Client::open(conn).map_err(map_err)?;
    match timeout(
        options.timeout().unwrap_or(DEFAULT_TIMEOUT),
        client.get_async_connection(),
    )
    .await
    {
        Ok(Ok(conn)) => Ok(conn),
        Ok(Err(err)) => Err(map_err(err)),
        Err(_) => Err(StreamErr::Connect("Connection timeout".to_owned())),
    }
}
