mod util;
use util::*;

static INIT: std::sync::Once = std::sync::Once::new();

// cargo test --test bootstrap --features=test,runtime-tokio -- --nocapture
#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn bootstrap_idempotent() -> anyhow::Result<()> {
    use logrelay_engine::GroupManager;
    use logrelay_memory::MemoryStore;
    use logrelay_types::{AutoStreamReset, StreamStore};
    use std::sync::Arc;

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("bootstrap");
    let options = options(&stream, "a");
    let groups = GroupManager::new(store.clone());

    assert!(!store.exists(&stream).await?);
    assert!(
        groups
            .ensure_group(&stream, options.group(), AutoStreamReset::Latest)
            .await?
    );
    // the stream is created along with the group
    assert!(store.exists(&stream).await?);
    assert!(
        !groups
            .ensure_group(&stream, options.group(), AutoStreamReset::Latest)
            .await?
    );

    assert!(
        groups
            .ensure_consumer(&stream, options.group(), options.consumer_id())
            .await?
    );
    assert!(
        !groups
            .ensure_consumer(&stream, options.group(), options.consumer_id())
            .await?
    );

    for _ in 0..3 {
        groups
            .bootstrap(
                &stream,
                options.group(),
                options.consumer_id(),
                AutoStreamReset::Latest,
            )
            .await?;
    }
    let infos = store.groups(&stream).await?;
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].name, "relay");
    assert_eq!(infos[0].consumers, 1);

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn bootstrap_concurrently() -> anyhow::Result<()> {
    use logrelay_engine::GroupManager;
    use logrelay_memory::MemoryStore;
    use logrelay_runtime::spawn_task;
    use logrelay_types::{AutoStreamReset, ConsumerGroup, ConsumerId, StreamStore};
    use std::sync::Arc;

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("bootstrap-race");

    // several processes starting at once, two of them with the same consumer id
    let mut tasks = Vec::new();
    for consumer in ["a", "b", "c", "a"] {
        let groups = GroupManager::new(store.clone());
        let stream = stream.clone();
        tasks.push(spawn_task(async move {
            groups
                .bootstrap(
                    &stream,
                    &ConsumerGroup::new("relay"),
                    &ConsumerId::new(consumer),
                    AutoStreamReset::Latest,
                )
                .await
        }));
    }
    for task in tasks {
        task.await??;
    }

    let infos = store.groups(&stream).await?;
    assert_eq!(infos.len(), 1);
    let mut consumers: Vec<String> = store
        .consumers(&stream, &ConsumerGroup::new("relay"))
        .await?
        .into_iter()
        .map(|c| c.name)
        .collect();
    consumers.sort();
    assert_eq!(consumers, ["a", "b", "c"]);

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn bootstrap_reset() -> anyhow::Result<()> {
    use logrelay_engine::{ActiveConsumer, ConcurrencyLimiter, PollTrigger};
    use logrelay_memory::MemoryStore;
    use logrelay_types::AutoStreamReset;
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("reset");
    produce(&store, &stream, 0..5);

    let mut latest = options(&stream, "a");
    latest.set_group(logrelay_types::ConsumerGroup::new("latest"));
    let mut earliest = options(&stream, "a");
    earliest
        .set_group(logrelay_types::ConsumerGroup::new("earliest"))
        .set_auto_stream_reset(AutoStreamReset::Earliest);

    let port_latest = Arc::new(TestPort::new());
    let port_earliest = Arc::new(TestPort::new());
    let make = |options: logrelay_engine::EngineOptions, port: Arc<TestPort>| {
        ActiveConsumer::new(
            store.clone(),
            port,
            Arc::new(options),
            ConcurrencyLimiter::single_flight(),
            Box::new(PollTrigger::new(Duration::from_secs(1))),
        )
    };
    let latest = make(latest, port_latest.clone());
    let earliest = make(earliest, port_earliest.clone());

    assert_eq!(latest.drain(&never()).await?.delivered, 0);
    assert_eq!(earliest.drain(&never()).await?.delivered, 5);

    // both groups see what comes after
    produce(&store, &stream, 5..7);
    assert_eq!(latest.drain(&never()).await?.delivered, 2);
    assert_eq!(earliest.drain(&never()).await?.delivered, 2);
    assert_eq!(port_latest.delivered(), ["5", "6"]);

    Ok(())
}
