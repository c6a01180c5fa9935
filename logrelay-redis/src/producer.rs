use flume::{bounded, r#async::RecvFut, unbounded, Sender};
use redis::{aio::ConnectionLike, cmd as command, Pipeline};
use std::{fmt::Debug, future::Future};

use crate::{
    is_connection_lost, map_err, parse_record_id, Connection, RedisErr, RedisProducerOptions,
    RedisResult,
};
use logrelay_runtime::spawn_task;
use logrelay_types::{
    encode_fields, export::futures::FutureExt, RecordId, StreamErr, StreamKey, Timestamp,
};

const MAX_RETRY: usize = 100;

#[derive(Debug, Clone)]
/// Appends records to one stream key, then announces them on the notification channel.
///
/// Sends are queued to a background task that pipelines every `XADD` it has
/// accumulated into a single round trip, followed by one `PUBLISH`.
pub struct RedisProducer {
    stream: StreamKey,
    sender: Sender<Request>,
}

type Receipt = Sender<RedisResult<RecordId>>;

enum Request {
    Send {
        fields: [(&'static str, String); 2],
        receipt: Receipt,
    },
    Flush(Sender<()>),
}

/// A future that returns the id assigned to the record. This future is cancel safe.
pub struct SendFuture {
    fut: RecvFut<'static, RedisResult<RecordId>>,
}

impl Debug for SendFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendFuture").finish()
    }
}

impl RedisProducer {
    pub fn stream_key(&self) -> &StreamKey {
        &self.stream
    }

    /// Queue a record stamped with the current time. Rejects an empty payload.
    pub fn send(&self, payload: &str) -> RedisResult<SendFuture> {
        self.send_at(&Timestamp::now_utc(), payload)
    }

    pub fn send_at(&self, timestamp: &Timestamp, payload: &str) -> RedisResult<SendFuture> {
        let fields = encode_fields(timestamp, payload)?;
        // one shot channel
        let (receipt, receiver) = bounded(1);
        // unbounded, so never blocks
        self.sender
            .send(Request::Send { fields, receipt })
            .map_err(|_| StreamErr::Backend(RedisErr::ProducerDied))?;
        Ok(SendFuture {
            fut: receiver.into_recv_async(),
        })
    }

    /// Wait until everything queued before has been sent.
    pub async fn flush(&self) -> RedisResult<()> {
        let (sender, receiver) = bounded(1);
        self.sender
            .send(Request::Flush(sender))
            .map_err(|_| StreamErr::Backend(RedisErr::ProducerDied))?;
        receiver
            .recv_async()
            .await
            .map_err(|_| StreamErr::Backend(RedisErr::ProducerDied))
    }

    /// Flush, then stop the background task once every clone has been dropped.
    pub async fn end(self) -> RedisResult<()> {
        self.flush().await
    }
}

impl Future for SendFuture {
    type Output = RedisResult<RecordId>;

    fn poll(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Self::Output> {
        match self.fut.poll_unpin(cx) {
            std::task::Poll::Ready(res) => std::task::Poll::Ready(match res {
                Ok(res) => res,
                Err(_) => Err(StreamErr::Backend(RedisErr::ProducerDied)),
            }),
            std::task::Poll::Pending => std::task::Poll::Pending,
        }
    }
}

pub(crate) fn create_producer(
    mut conn: Connection,
    stream: StreamKey,
    options: RedisProducerOptions,
) -> RedisResult<RedisProducer> {
    let (sender, receiver) = unbounded();
    let key = stream.clone();

    // Redis commands are exclusive (`&mut self`), so we need a producer task
    spawn_task(async move {
        // exit if all senders have been dropped
        while let Ok(request) = receiver.recv_async().await {
            let mut requests = vec![request];
            requests.extend(receiver.drain());

            let mut batch: Vec<([(&'static str, String); 2], Receipt)> = Vec::new();
            for request in requests {
                match request {
                    Request::Send { fields, receipt } => batch.push((fields, receipt)),
                    Request::Flush(done) => {
                        if !send_batch(&mut conn, &key, &options, std::mem::take(&mut batch)).await
                        {
                            return;
                        }
                        done.send_async(()).await.ok();
                    }
                }
            }
            if !send_batch(&mut conn, &key, &options, batch).await {
                return;
            }
        }
        log::debug!("Producer of stream {key} ended");
    });

    Ok(RedisProducer { stream, sender })
}

/// Send one pipeline of `XADD`s plus a `PUBLISH`, and hand out the receipts.
/// Returns false if the connection is dead, which kills the producer.
async fn send_batch(
    conn: &mut Connection,
    stream: &StreamKey,
    options: &RedisProducerOptions,
    batch: Vec<([(&'static str, String); 2], Receipt)>,
) -> bool {
    if batch.is_empty() {
        return true;
    }
    let mut pipe = Pipeline::new();
    for (fields, _) in batch.iter() {
        let mut cmd = command("XADD");
        cmd.arg(stream.name());
        if let Some(max_len) = options.max_len() {
            cmd.arg("MAXLEN").arg("~").arg(max_len);
        }
        cmd.arg("*");
        for (field, value) in fields.iter() {
            cmd.arg(*field).arg(value);
        }
        pipe.add_command(cmd);
    }
    let mut replies = batch.len();
    if let Some(channel) = options.notification_channel() {
        let mut cmd = command("PUBLISH");
        cmd.arg(channel).arg(stream.name());
        pipe.add_command(cmd);
        replies += 1;
    }

    let mut retried = 0;
    let results: Vec<RedisResult<RecordId>> = loop {
        let c = match conn.get().await {
            Ok(c) => c,
            Err(StreamErr::Backend(RedisErr::TryAgain(_))) => continue,
            Err(err) => {
                log::error!("Producer of stream {stream} lost its connection: {err}");
                for (_, receipt) in batch {
                    receipt
                        .send_async(Err(StreamErr::Connect(err.to_string())))
                        .await
                        .ok();
                }
                return false;
            }
        };
        match c.req_packed_commands(&pipe, 0, replies).await {
            Ok(ids) => {
                // the trailing PUBLISH reply is the subscriber count
                break ids
                    .into_iter()
                    .take(batch.len())
                    .map(|id| parse_record_id(id).map_err(StreamErr::Backend))
                    .collect();
            }
            Err(err) if is_connection_lost(&err) && retried < MAX_RETRY => {
                retried += 1;
                log::warn!("XADD to {stream} failed, retrying ({retried}): {err}");
                conn.reconnect();
            }
            Err(err) => {
                let err = match map_err(err) {
                    StreamErr::Backend(err) => err,
                    other => RedisErr::Unknown(other.to_string()),
                };
                break std::iter::repeat_with(|| Err(StreamErr::Backend(err.clone())))
                    .take(batch.len())
                    .collect();
            }
        }
    };

    log::trace!("Appended {} records to {stream}", results.len());
    for ((_, receipt), result) in batch.into_iter().zip(results.into_iter()) {
        receipt.send_async(result).await.ok();
    }
    true
}
