mod util;
use util::*;

static INIT: std::sync::Once = std::sync::Once::new();

// cargo test --test active-consumer --features=test,runtime-tokio -- --nocapture
#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn drain_in_batches() -> anyhow::Result<()> {
    use logrelay_engine::{ActiveConsumer, ConcurrencyLimiter, PollTrigger};
    use logrelay_memory::MemoryStore;
    use logrelay_types::AutoStreamReset;
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("drain");
    let mut options = options(&stream, "a");
    options
        .set_batch_size(50)
        .set_auto_stream_reset(AutoStreamReset::Earliest);
    produce(&store, &stream, 0..120);

    let port = Arc::new(TestPort::new());
    let consumer = ActiveConsumer::new(
        store.clone(),
        port.clone(),
        Arc::new(options.clone()),
        ConcurrencyLimiter::single_flight(),
        Box::new(PollTrigger::new(Duration::from_secs(1))),
    );

    // the group does not exist yet: the first read bootstraps it
    let report = consumer.drain(&never()).await?;
    assert_eq!(report.reads, 4);
    assert_eq!(report.delivered, 120);
    assert_eq!(report.acked, 120);
    assert_eq!(port.batch_sizes(), [50, 50, 20]);
    let expected: Vec<String> = (0..120).map(|i| i.to_string()).collect();
    assert_eq!(port.delivered(), expected);
    assert_eq!(pending_count(&store, &options).await, 0);

    // nothing left
    let report = consumer.drain(&never()).await?;
    assert_eq!(report.reads, 1);
    assert_eq!(report.delivered, 0);

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn partial_delivery() -> anyhow::Result<()> {
    use logrelay_engine::{ActiveConsumer, ConcurrencyLimiter, PollTrigger, ReclaimScanner};
    use logrelay_memory::MemoryStore;
    use logrelay_types::{IdBound, StreamStore};
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("partial");
    let options = Arc::new(options(&stream, "a"));
    let port = Arc::new(TestPort::new());
    let consumer = ActiveConsumer::new(
        store.clone(),
        port.clone(),
        options.clone(),
        ConcurrencyLimiter::single_flight(),
        Box::new(PollTrigger::new(Duration::from_secs(1))),
    );
    // bootstrap with the default reset: only what comes after
    consumer.drain(&never()).await?;
    produce(&store, &stream, 0..10);

    port.reject(&["2", "5", "7"]);
    let report = consumer.drain(&never()).await?;
    assert_eq!(report.delivered, 10);
    assert_eq!(report.acked, 7);

    let pending = store
        .pending(options.stream_key(), options.group(), IdBound::Minus, 100)
        .await?;
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|p| p.consumer == "a"));

    // the port recovers; once idle, the rest is retried by the reclaim scanner
    port.reject(&[]);
    store.advance(Duration::from_secs(6));
    let scanner = ReclaimScanner::new(store.clone(), port.clone(), options.clone());
    let report = scanner.sweep(&never()).await?.expect("not sweeping");
    assert_eq!(report.claimed, 3);
    assert_eq!(report.acked, 3);
    assert_eq!(port.batches().last().unwrap(), &["2", "5", "7"]);
    assert_eq!(pending_count(&store, &options).await, 0);

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn no_ack_on_port_error() -> anyhow::Result<()> {
    use logrelay_engine::{ActiveConsumer, ConcurrencyLimiter, PollTrigger};
    use logrelay_memory::MemoryStore;
    use logrelay_types::AutoStreamReset;
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("port-error");
    let mut options = options(&stream, "a");
    options
        .set_batch_size(4)
        .set_auto_stream_reset(AutoStreamReset::Earliest);
    let options = Arc::new(options);
    produce(&store, &stream, 0..10);

    let port = Arc::new(TestPort::new());
    port.set_fail(true);
    let consumer = ActiveConsumer::new(
        store.clone(),
        port.clone(),
        options.clone(),
        ConcurrencyLimiter::single_flight(),
        Box::new(PollTrigger::new(Duration::from_secs(1))),
    );

    let report = consumer.drain(&never()).await?;
    // the drain stops at the first failed batch
    assert!(report.interrupted);
    assert_eq!(report.delivered, 4);
    assert_eq!(report.acked, 0);
    assert_eq!(pending_count(&store, &options).await, 4);

    // the next wake-up picks up where the reads left off; nothing was acked
    port.set_fail(false);
    let report = consumer.drain(&never()).await?;
    assert_eq!(report.delivered, 6);
    assert_eq!(report.acked, 6);
    assert_eq!(pending_count(&store, &options).await, 4);

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn store_error_keeps_records_pending() -> anyhow::Result<()> {
    use logrelay_engine::{ActiveConsumer, ConcurrencyLimiter, PollTrigger};
    use logrelay_memory::MemoryStore;
    use logrelay_types::AutoStreamReset;
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("store-error");
    let mut options = options(&stream, "a");
    options.set_auto_stream_reset(AutoStreamReset::Earliest);
    let options = Arc::new(options);
    let consumer = ActiveConsumer::new(
        store.clone(),
        Arc::new(TestPort::new()),
        options.clone(),
        ConcurrencyLimiter::single_flight(),
        Box::new(PollTrigger::new(Duration::from_secs(1))),
    );
    consumer.drain(&never()).await?;
    produce(&store, &stream, 0..3);

    store.set_unavailable(true);
    assert!(consumer.drain(&never()).await.is_err());
    store.set_unavailable(false);
    assert_eq!(pending_count(&store, &options).await, 0);
    assert_eq!(consumer.drain(&never()).await?.acked, 3);

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn drain_stops_on_shutdown() -> anyhow::Result<()> {
    use logrelay_engine::{shutdown_channel, ActiveConsumer, ConcurrencyLimiter, PollTrigger};
    use logrelay_memory::MemoryStore;
    use logrelay_types::AutoStreamReset;
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("shutdown");
    let mut options = options(&stream, "a");
    options.set_auto_stream_reset(AutoStreamReset::Earliest);
    produce(&store, &stream, 0..5);
    let port = Arc::new(TestPort::new());
    let consumer = ActiveConsumer::new(
        store.clone(),
        port.clone(),
        Arc::new(options),
        ConcurrencyLimiter::single_flight(),
        Box::new(PollTrigger::new(Duration::from_secs(1))),
    );

    let (mut handle, shutdown) = shutdown_channel();
    handle.trigger();
    let report = consumer.drain(&shutdown).await?;
    assert!(report.interrupted);
    assert_eq!(report.reads, 0);
    assert!(port.batches().is_empty());

    Ok(())
}

#[cfg(feature = "test")]
#[cfg_attr(feature = "runtime-tokio", tokio::test)]
#[cfg_attr(feature = "runtime-async-std", async_std::test)]
async fn malformed_batch_does_not_end_drain() -> anyhow::Result<()> {
    use logrelay_engine::{ActiveConsumer, ConcurrencyLimiter, PollTrigger};
    use logrelay_memory::MemoryStore;
    use logrelay_types::{AutoStreamReset, RecordId};
    use std::{sync::Arc, time::Duration};

    INIT.call_once(env_logger::init);

    let store = Arc::new(MemoryStore::new());
    let stream = stream_key("malformed");
    let mut options = options(&stream, "a");
    options
        .set_batch_size(2)
        .set_auto_stream_reset(AutoStreamReset::Earliest);
    // a whole first batch without a `Data` field
    for seq in 1..=2 {
        store.append_fields(
            &stream,
            Some(RecordId::new(seq, 0)),
            vec![("Other".to_owned(), b"x".to_vec())],
        )?;
    }
    produce(&store, &stream, 0..3);
    assert_eq!(store.len(&stream), 5);

    let port = Arc::new(TestPort::new());
    let consumer = ActiveConsumer::new(
        store.clone(),
        port.clone(),
        Arc::new(options.clone()),
        ConcurrencyLimiter::single_flight(),
        Box::new(PollTrigger::new(Duration::from_secs(1))),
    );

    let report = consumer.drain(&never()).await?;
    assert_eq!(report.reads, 4);
    assert_eq!(report.delivered, 3);
    assert_eq!(report.acked, 3);
    assert!(!report.interrupted);
    assert_eq!(port.delivered(), ["0", "1", "2"]);
    // the malformed entries are left for an operator
    assert_eq!(pending_count(&store, &options).await, 2);

    Ok(())
}
