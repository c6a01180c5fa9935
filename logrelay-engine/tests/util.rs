use logrelay_engine::{EngineOptions, Shutdown};
use logrelay_memory::MemoryStore;
use logrelay_runtime::{sleep, timeout};
use logrelay_types::{
    export::async_trait, timestamp_to_millis, ConsumerGroup, ConsumerId, DeliveryErr,
    DeliveryPort, DeliveryResult, IdBound, RecordId, StreamKey, StreamRecord, StreamStore,
    Timestamp,
};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

/// A Delivery Port that records what it was given.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct TestPort {
    batches: Mutex<Vec<Vec<String>>>,
    reject: Mutex<HashSet<String>>,
    fail: AtomicBool,
    delay: Mutex<Duration>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

#[allow(dead_code)]
impl TestPort {
    pub fn new() -> Self {
        Default::default()
    }

    /// Leave these payloads unconfirmed.
    pub fn reject(&self, payloads: &[&str]) {
        let mut reject = self.reject.lock().unwrap();
        reject.clear();
        reject.extend(payloads.iter().map(|p| p.to_string()));
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Payloads of every batch delivered, successful or not.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches().iter().map(|b| b.len()).collect()
    }

    pub fn delivered(&self) -> Vec<String> {
        self.batches().into_iter().flatten().collect()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryPort for TestPort {
    async fn deliver(&self, records: &[StreamRecord]) -> DeliveryResult<Vec<RecordId>> {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.batches
            .lock()
            .unwrap()
            .push(records.iter().map(|r| r.payload().to_owned()).collect());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(DeliveryErr::Unavailable("sink is down".to_owned()));
        }
        let reject = self.reject.lock().unwrap();
        Ok(records
            .iter()
            .filter(|r| !reject.contains(r.payload()))
            .map(|r| *r.id())
            .collect())
    }
}

#[allow(dead_code)]
pub fn stream_key(name: &str) -> StreamKey {
    let now = Timestamp::now_utc();
    StreamKey::new(format!("{}-{}", name, timestamp_to_millis(&now))).unwrap()
}

#[allow(dead_code)]
pub fn options(stream: &StreamKey, consumer: &str) -> EngineOptions {
    let mut options = EngineOptions::new(stream.clone());
    options
        .set_group(ConsumerGroup::new("relay"))
        .set_consumer_id(ConsumerId::new(consumer))
        .set_idle_threshold(Duration::from_secs(5))
        .set_shutdown_grace(Duration::from_secs(5))
        .set_restart_delay(Duration::ZERO);
    options
}

#[allow(dead_code)]
pub fn produce(store: &MemoryStore, stream: &StreamKey, range: std::ops::Range<usize>) {
    let now = Timestamp::now_utc();
    for i in range {
        store.append(stream, &now, &format!("{i}")).unwrap();
    }
}

#[allow(dead_code)]
pub async fn pending_count(store: &MemoryStore, options: &EngineOptions) -> usize {
    store
        .pending(
            options.stream_key(),
            options.group(),
            IdBound::Minus,
            usize::MAX,
        )
        .await
        .unwrap()
        .len()
}

/// Poll until the condition holds, or panic after a while.
#[allow(dead_code)]
pub async fn eventually<F: FnMut() -> bool>(what: &str, mut cond: F) {
    let res = timeout(Duration::from_secs(10), async {
        while !cond() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    if res.is_err() {
        panic!("Timed out waiting for {what}");
    }
}

#[allow(dead_code)]
pub fn never() -> Shutdown {
    Shutdown::never()
}
