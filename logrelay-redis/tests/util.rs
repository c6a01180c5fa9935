use logrelay_redis::{RedisConnectOptions, RedisProducer, RedisStore};
use logrelay_types::{timestamp_to_millis, RecordId, StreamKey, Timestamp};

#[allow(dead_code)]
pub async fn connect() -> anyhow::Result<RedisStore> {
    let store = RedisStore::connect(
        std::env::var("BROKERS_URL")
            .unwrap_or_else(|_| "redis://localhost".to_owned())
            .parse()?,
        RedisConnectOptions::default(),
    )
    .await?;
    Ok(store)
}

#[allow(dead_code)]
pub fn stream_key(name: &str) -> StreamKey {
    let now = Timestamp::now_utc();
    StreamKey::new(format!("{}-{}", name, timestamp_to_millis(&now))).unwrap()
}

/// Append `0..n` and wait for the ids.
#[allow(dead_code)]
pub async fn produce(producer: &RedisProducer, range: std::ops::Range<usize>) -> Vec<RecordId> {
    let mut futures = Vec::new();
    for i in range {
        futures.push(producer.send(&format!("{i}")).unwrap());
    }
    let mut ids = Vec::new();
    for fut in futures {
        ids.push(fut.await.unwrap());
    }
    ids
}
