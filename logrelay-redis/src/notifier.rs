use flume::{bounded, Receiver, Sender, TrySendError};
use std::{sync::Arc, time::Duration};

use crate::{create_connection, map_err, RedisConnectOptions, RedisResult};
use logrelay_runtime::{sleep, spawn_task};
use logrelay_types::{export::futures::StreamExt, StoreUrl};

const MAX_BACKOFF_SECS: u64 = 60;

/// Subscribe to a notification channel. Every message published on it becomes one wake-up
/// on the returned receiver; the payload is ignored.
///
/// Wake-ups coalesce: while one is waiting to be received, further ones are dropped.
/// The first subscription must succeed; after that, a dropped connection is resubscribed
/// in the background with backoff. The background task ends once the receiver is dropped.
pub async fn subscribe_notifications(
    url: StoreUrl,
    options: Arc<RedisConnectOptions>,
    channel: String,
) -> RedisResult<Receiver<()>> {
    let mut pubsub = create_pubsub(&url, &options, &channel).await?;
    let (sender, receiver) = bounded(1);

    spawn_task(async move {
        let mut delay = 1;
        loop {
            if !forward(&mut pubsub, &sender).await {
                log::debug!("Notification receiver of `{channel}` dropped");
                return;
            }
            log::warn!("Subscription to `{channel}` on {url} ended, resubscribing");
            loop {
                sleep(Duration::from_secs(delay)).await;
                if sender.is_disconnected() {
                    return;
                }
                match create_pubsub(&url, &options, &channel).await {
                    Ok(p) => {
                        log::info!("Resubscribed to `{channel}` on {url}");
                        pubsub = p;
                        delay = 1;
                        break;
                    }
                    Err(err) => {
                        log::debug!("Resubscribing to `{channel}` failed: {err}");
                        delay = (delay * 2).min(MAX_BACKOFF_SECS);
                    }
                }
            }
        }
    });

    Ok(receiver)
}

async fn create_pubsub(
    url: &StoreUrl,
    options: &RedisConnectOptions,
    channel: &str,
) -> RedisResult<redis::aio::PubSub> {
    let conn = create_connection(url, options).await?;
    let mut pubsub = conn.into_pubsub();
    pubsub.subscribe(channel).await.map_err(map_err)?;
    Ok(pubsub)
}

/// Forward messages until the subscription ends. Returns false if the receiver is gone.
async fn forward(pubsub: &mut redis::aio::PubSub, sender: &Sender<()>) -> bool {
    let mut messages = pubsub.on_message();
    while messages.next().await.is_some() {
        match sender.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => (),
            Err(TrySendError::Disconnected(())) => return false,
        }
    }
    !sender.is_disconnected()
}
