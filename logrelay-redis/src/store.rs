use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    create_producer, is_connection_lost, is_no_such_key, map_err, map_group_err,
    parse_consumers_reply, parse_entries, parse_groups_reply, parse_pending_reply,
    parse_read_group_reply, reply::int_from_redis_value, reply::string_from_redis_value,
    subscribe_notifications, Connection, Entries, RedisConnectOptions, RedisErr, RedisProducer,
    RedisProducerOptions, RedisResult,
};
use flume::Receiver;
use logrelay_runtime::AsyncMutex;
use logrelay_types::{
    export::async_trait, AutoStreamReset, ConsumerGroup, ConsumerId, ConsumerInfo, GroupInfo,
    IdBound, PendingEntry, ReadBatch, RecordId, StoreUrl, StreamErr, StreamKey, StreamRecord,
    StreamStore,
};
use redis::{aio::ConnectionLike, cmd as command, Cmd, RedisError, Value};

/// A [`StreamStore`] backed by Redis Streams.
///
/// Commands are issued one at a time over a single auto-reconnecting connection.
/// Reads are never blocking (no `BLOCK`), so no command holds the connection for long.
#[derive(Debug)]
pub struct RedisStore {
    url: StoreUrl,
    options: Arc<RedisConnectOptions>,
    conn: AsyncMutex<Connection>,
}

impl RedisStore {
    /// Connect to the store. Fails if the first connection cannot be established.
    pub async fn connect(url: StoreUrl, options: RedisConnectOptions) -> RedisResult<Self> {
        let options = Arc::new(options);
        let conn = Connection::create(url.clone(), options.clone()).await?;
        Ok(Self {
            url,
            options,
            conn: AsyncMutex::new(conn),
        })
    }

    pub fn url(&self) -> &StoreUrl {
        &self.url
    }

    pub fn options(&self) -> &RedisConnectOptions {
        &self.options
    }

    /// A producer appending to `stream` over a connection of its own.
    /// If Redis is unreachable, sends are held back until it reconnects.
    pub async fn create_producer(
        &self,
        stream: StreamKey,
        options: RedisProducerOptions,
    ) -> RedisResult<RedisProducer> {
        let conn = Connection::create_or_reconnect(self.url.clone(), self.options.clone()).await;
        create_producer(conn, stream, options)
    }

    /// Wake-up signals from the notification channel, over a connection of its own.
    pub async fn subscribe(&self, channel: &str) -> RedisResult<Receiver<()>> {
        subscribe_notifications(self.url.clone(), self.options.clone(), channel.to_owned()).await
    }

    /// Send a command. The outer error is about the connection, the inner one is the reply.
    async fn request(
        &self,
        name: &'static str,
        cmd: &Cmd,
    ) -> RedisResult<Result<Value, RedisError>> {
        let mut conn = self.conn.lock().await;
        let start = Instant::now();
        let res = conn.get().await?.req_packed_command(cmd).await;
        let elapsed = start.elapsed();
        if let Some(threshold) = self.options.slow_command_threshold() {
            if elapsed > threshold {
                log::warn!("Slow command {name} on {}: took {elapsed:?}", self.url);
            }
        }
        if let Err(err) = &res {
            if is_connection_lost(err) {
                conn.reconnect();
            }
        }
        Ok(res)
    }

    async fn query(&self, name: &'static str, cmd: &Cmd) -> RedisResult<Value> {
        self.request(name, cmd).await?.map_err(map_err)
    }

    async fn query_group(
        &self,
        name: &'static str,
        cmd: &Cmd,
        stream: &StreamKey,
        group: &ConsumerGroup,
    ) -> RedisResult<Value> {
        self.request(name, cmd)
            .await?
            .map_err(|err| map_group_err(err, stream, group.name()))
    }

    fn records(&self, stream: &StreamKey, entries: Entries) -> Vec<StreamRecord> {
        for (id, err) in entries.malformed {
            log::warn!("Skipping malformed entry {id} of stream {stream}: {err}");
        }
        entries.records
    }
}

#[async_trait]
impl StreamStore for RedisStore {
    type Error = RedisErr;

    async fn exists(&self, stream: &StreamKey) -> RedisResult<bool> {
        let mut cmd = command("EXISTS");
        cmd.arg(stream.name());
        let value = self.query("EXISTS", &cmd).await?;
        Ok(int(value)? > 0)
    }

    async fn groups(&self, stream: &StreamKey) -> RedisResult<Vec<GroupInfo>> {
        let mut cmd = command("XINFO");
        cmd.arg("GROUPS").arg(stream.name());
        match self.request("XINFO GROUPS", &cmd).await? {
            Ok(value) => parse_groups_reply(value).map_err(StreamErr::Backend),
            Err(err) if is_no_such_key(&err) => Ok(Vec::new()),
            Err(err) => Err(map_err(err)),
        }
    }

    async fn create_group(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        reset: AutoStreamReset,
    ) -> RedisResult<()> {
        let mut cmd = command("XGROUP");
        cmd.arg("CREATE")
            .arg(stream.name())
            .arg(group.name())
            .arg(reset.group_start_id())
            .arg("MKSTREAM");
        self.query_group("XGROUP CREATE", &cmd, stream, group).await?;
        Ok(())
    }

    async fn consumers(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
    ) -> RedisResult<Vec<ConsumerInfo>> {
        let mut cmd = command("XINFO");
        cmd.arg("CONSUMERS").arg(stream.name()).arg(group.name());
        let value = self
            .query_group("XINFO CONSUMERS", &cmd, stream, group)
            .await?;
        parse_consumers_reply(value).map_err(StreamErr::Backend)
    }

    async fn create_consumer(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
    ) -> RedisResult<bool> {
        let mut cmd = command("XGROUP");
        cmd.arg("CREATECONSUMER")
            .arg(stream.name())
            .arg(group.name())
            .arg(consumer.id());
        let value = self
            .query_group("XGROUP CREATECONSUMER", &cmd, stream, group)
            .await?;
        Ok(int(value)? == 1)
    }

    async fn delete_consumer(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
    ) -> RedisResult<u64> {
        let mut cmd = command("XGROUP");
        cmd.arg("DELCONSUMER")
            .arg(stream.name())
            .arg(group.name())
            .arg(consumer.id());
        let value = self
            .query_group("XGROUP DELCONSUMER", &cmd, stream, group)
            .await?;
        Ok(int(value)?.max(0) as u64)
    }

    async fn read_group(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
        count: usize,
    ) -> RedisResult<ReadBatch> {
        let mut cmd = command("XREADGROUP");
        cmd.arg("GROUP")
            .arg(group.name())
            .arg(consumer.id())
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(stream.name())
            .arg(">");
        let value = self.query_group("XREADGROUP", &cmd, stream, group).await?;
        let entries = parse_read_group_reply(value).map_err(StreamErr::Backend)?;
        let read = entries.records.len() + entries.malformed.len();
        Ok(ReadBatch {
            records: self.records(stream, entries),
            read,
        })
    }

    async fn pending(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        start: IdBound,
        count: usize,
    ) -> RedisResult<Vec<PendingEntry>> {
        let mut cmd = command("XPENDING");
        cmd.arg(stream.name())
            .arg(group.name())
            .arg(start.format())
            .arg("+")
            .arg(count);
        let value = self.query_group("XPENDING", &cmd, stream, group).await?;
        parse_pending_reply(value).map_err(StreamErr::Backend)
    }

    async fn claim(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        consumer: &ConsumerId,
        min_idle: Duration,
        ids: &[RecordId],
    ) -> RedisResult<Vec<StreamRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut cmd = command("XCLAIM");
        cmd.arg(stream.name())
            .arg(group.name())
            .arg(consumer.id())
            .arg(min_idle.as_millis() as u64);
        for id in ids {
            cmd.arg(id.to_string());
        }
        let value = self.query_group("XCLAIM", &cmd, stream, group).await?;
        let entries = parse_entries(value).map_err(StreamErr::Backend)?;
        Ok(self.records(stream, entries))
    }

    async fn ack(
        &self,
        stream: &StreamKey,
        group: &ConsumerGroup,
        ids: &[RecordId],
    ) -> RedisResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut cmd = command("XACK");
        cmd.arg(stream.name()).arg(group.name());
        for id in ids {
            cmd.arg(id.to_string());
        }
        let value = self.query_group("XACK", &cmd, stream, group).await?;
        Ok(int(value)?.max(0) as u64)
    }

    async fn trim_before(&self, stream: &StreamKey, min_id: RecordId) -> RedisResult<u64> {
        let mut cmd = command("XTRIM");
        cmd.arg(stream.name()).arg("MINID").arg(min_id.to_string());
        let value = self.query("XTRIM", &cmd).await?;
        Ok(int(value)?.max(0) as u64)
    }

    async fn ping(&self) -> RedisResult<String> {
        let mut cmd = command("ECHO");
        cmd.arg("PONG");
        let value = self.query("ECHO", &cmd).await?;
        string_from_redis_value(value).map_err(StreamErr::Backend)
    }
}

fn int(value: Value) -> RedisResult<i64> {
    int_from_redis_value(value).map_err(StreamErr::Backend)
}
