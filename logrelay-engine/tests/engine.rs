mod util;
use util::*;

static INIT: std::sync::Once = std::sync::Once::new();

// cargo test --test engine --features=test,runtime-tokio -- --nocapture
#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn relay_until_shutdown() -> anyhow::Result<()> {
    use logrelay_engine::{shutdown_channel, Engine, SignalTrigger};
    use logrelay_memory::{MemoryProducer, MemoryStore};
    use logrelay_runtime::spawn_task;
    use std::sync::Arc;

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("relay");
    let mut options = options(&stream, "a");
    options.set_batch_size(7);
    let port = Arc::new(TestPort::new());
    let engine = Engine::new(store.clone(), port.clone(), options.clone())?;
    engine.bootstrap().await?;
    let limiter = engine.limiter().clone();

    let trigger = Box::new(SignalTrigger::new(store.subscribe()));
    let (mut handle, shutdown) = shutdown_channel();
    let task = spawn_task(async move { engine.run(trigger, shutdown).await });

    let producer = MemoryProducer::new(store.clone(), stream.clone());
    let payloads: Vec<String> = (0..50).map(|i| i.to_string()).collect();
    for chunk in payloads.chunks(10) {
        producer.send_batch(chunk.iter().map(|p| p.as_str()))?;
    }
    eventually("all records delivered", || port.delivered().len() >= 50).await;
    eventually("drains to finish", || limiter.total_active() == 0).await;
    assert_eq!(pending_count(&store, &options).await, 0);

    handle.trigger();
    task.await??;

    let mut delivered = port.delivered();
    delivered.sort_by_key(|p| p.parse::<u32>().unwrap());
    assert_eq!(delivered, payloads);

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn back_to_back_wakeups() -> anyhow::Result<()> {
    use logrelay_engine::{shutdown_channel, Engine, Runner, SignalTrigger};
    use logrelay_memory::{MemoryProducer, MemoryStore};
    use logrelay_runtime::{sleep, spawn_task};
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("back-to-back");
    let mut options = options(&stream, "a");
    options.set_batch_size(3);
    let port = Arc::new(TestPort::new());
    port.set_delay(Duration::from_millis(30));
    let engine = Engine::new(store.clone(), port.clone(), options)?;
    engine.bootstrap().await?;

    let consumer = engine.active_consumer(Box::new(SignalTrigger::new(store.subscribe())));
    let (mut handle, shutdown) = shutdown_channel();
    let task = spawn_task(async move { consumer.run(shutdown).await });

    // wake-ups keep coming while a drain is in progress
    let producer = MemoryProducer::new(store.clone(), stream.clone());
    for i in 0..20 {
        producer.send(&i.to_string())?;
        sleep(Duration::from_millis(5)).await;
    }
    eventually("all records delivered", || port.delivered().len() >= 20).await;
    // nothing is left behind by a wake-up absorbed into a running drain
    eventually("drains to finish", || engine.limiter().total_active() == 0).await;
    assert_eq!(pending_count(&store, engine.options()).await, 0);
    assert_eq!(port.max_active(), 1);
    assert_eq!(port.delivered().len(), 20);

    handle.trigger();
    task.await??;

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn wakeup_waits_for_global_slot() -> anyhow::Result<()> {
    use logrelay_engine::{shutdown_channel, Engine, Runner, SignalTrigger};
    use logrelay_memory::MemoryStore;
    use logrelay_runtime::spawn_task;
    use logrelay_types::Timestamp;
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let port = Arc::new(TestPort::new());
    port.set_delay(Duration::from_millis(300));
    let (stream_a, stream_b) = (stream_key("global-a"), stream_key("global-b"));
    let mut options_a = options(&stream_a, "a");
    options_a.set_concurrency_limit(Some(1));
    let mut options_b = options(&stream_b, "a");
    options_b.set_concurrency_limit(Some(1));
    let engine_a = Engine::new(store.clone(), port.clone(), options_a)?;
    let engine_b = Engine::new(store.clone(), port.clone(), options_b)?.share_limiters(&engine_a);
    engine_a.bootstrap().await?;
    engine_b.bootstrap().await?;
    let limiter = engine_a.limiter().clone();

    let now = Timestamp::now_utc();
    store.append(&stream_a, &now, "a1")?;
    store.append(&stream_b, &now, "b1")?;

    let (signal_a, wake_a) = flume::unbounded();
    let (signal_b, wake_b) = flume::unbounded();
    let consumer_a = engine_a.active_consumer(Box::new(SignalTrigger::new(wake_a)));
    let consumer_b = engine_b.active_consumer(Box::new(SignalTrigger::new(wake_b)));
    let (mut handle, shutdown) = shutdown_channel();

    let shutdown_a = shutdown.clone();
    let task_a = spawn_task(async move { consumer_a.run(shutdown_a).await });
    eventually("a to hold the only slot", || limiter.total_active() == 1).await;

    // b's start wake-up and a signal both arrive while a is draining
    let task_b = spawn_task(async move { consumer_b.run(shutdown).await });
    signal_b.send(())?;

    eventually("b1 delivered", || port.delivered().contains(&"b1".to_owned())).await;
    eventually("drains to finish", || limiter.total_active() == 0).await;
    assert_eq!(port.delivered(), ["a1", "b1"]);
    assert_eq!(port.max_active(), 1);

    handle.trigger();
    task_a.await??;
    task_b.await??;
    drop((signal_a, signal_b));

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn health_probe_never_fails() -> anyhow::Result<()> {
    use logrelay_engine::{shutdown_channel, Engine, Supervisor};
    use logrelay_memory::{MemoryErr, MemoryStore};
    use logrelay_runtime::{sleep, spawn_task};
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("health");
    let mut options = options(&stream, "a");
    options.set_health_check_interval(Duration::from_millis(10));
    let engine = Engine::new(store.clone(), Arc::new(TestPort::new()), options)?;

    let probe = engine.health_probe();
    assert!(probe.probe().await);
    store.set_unavailable(true);
    assert!(!probe.probe().await);

    let mut supervisor: Supervisor<MemoryErr> = Supervisor::new(0, Duration::from_secs(1));
    supervisor.add_runner(Arc::new(probe));
    let (mut handle, shutdown) = shutdown_channel();
    let task = spawn_task(async move { supervisor.run(shutdown).await });
    sleep(Duration::from_millis(100)).await;
    store.set_unavailable(false);
    sleep(Duration::from_millis(50)).await;
    handle.trigger();
    task.await??;

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn bootstrap_failure_is_fatal() -> anyhow::Result<()> {
    use logrelay_engine::{Engine, PollTrigger};
    use logrelay_memory::MemoryStore;
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    store.set_unavailable(true);
    let engine = Engine::new(
        store.clone(),
        Arc::new(TestPort::new()),
        options(&stream_key("fatal"), "a"),
    )?;
    let res = engine
        .run(Box::new(PollTrigger::new(Duration::from_secs(1))), never())
        .await;
    assert!(res.is_err());

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn invalid_options() -> anyhow::Result<()> {
    use logrelay_engine::Engine;
    use logrelay_memory::MemoryStore;
    use logrelay_types::StreamErr;
    use std::sync::Arc;

    INIT.call_once(env_logger::init);

    let mut options = options(&stream_key("invalid"), "a");
    options.set_batch_size(0);
    let res = Engine::new(
        Arc::new(MemoryStore::new()),
        Arc::new(TestPort::new()),
        options,
    );
    assert!(matches!(res, Err(StreamErr::Config(_))));

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn retention_trim() -> anyhow::Result<()> {
    use logrelay_engine::{retention_cutoff, Engine};
    use logrelay_memory::MemoryStore;
    use logrelay_types::{
        encode_fields, timestamp_to_millis, AutoStreamReset, RecordId, StreamStore, Timestamp,
    };
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let day = Duration::from_secs(86400);
    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("retention");
    let mut options = options(&stream, "a");
    options
        .set_retention(Some(day * 7))
        .set_auto_stream_reset(AutoStreamReset::Earliest);
    let engine = Engine::new(store.clone(), Arc::new(TestPort::new()), options)?;

    let now = Timestamp::now_utc();
    for (i, age) in [10u32, 9, 8, 1].into_iter().enumerate() {
        let at = now - day * age;
        let fields = encode_fields(&at, &format!("{i}"))?
            .into_iter()
            .map(|(k, v)| (k.to_owned(), v.into_bytes()))
            .collect();
        let id = RecordId::from_millis(timestamp_to_millis(&at) as u64);
        store.append_fields(&stream, Some(id), fields)?;
    }
    engine.bootstrap().await?;
    // one old entry is pending; trimming removes it all the same
    store
        .read_group(&stream, engine.options().group(), engine.options().consumer_id(), 1)
        .await?;

    let sweeper = engine.retention_sweeper().expect("retention is set");
    let removed = sweeper.trim(retention_cutoff(now, day * 7)).await?;
    assert_eq!(removed, 3);
    assert_eq!(store.len(&stream), 1);
    assert_eq!(sweeper.trim(retention_cutoff(now, day * 7)).await?, 0);

    Ok(())
}
