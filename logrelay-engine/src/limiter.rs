use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use flume::{Receiver, Sender, TrySendError};
use logrelay_types::StreamKey;

/// Bounds how many tasks may work on the same stream key at once,
/// and optionally how many may run across all keys.
///
/// Cloning yields another handle to the same slots.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    state: Arc<Mutex<LimiterState>>,
    per_key: usize,
    global: Option<usize>,
}

#[derive(Debug, Default)]
struct LimiterState {
    slots: HashMap<StreamKey, Slot>,
    total: usize,
    wakers: HashMap<StreamKey, Vec<Sender<()>>>,
}

#[derive(Debug, Default)]
struct Slot {
    active: usize,
    /// A wake-up arrived for this key that has not been served yet.
    notified: bool,
}

/// Grants the right to work on a stream key. Released on drop.
#[derive(Debug)]
pub struct Permit {
    limiter: ConcurrencyLimiter,
    key: StreamKey,
}

impl ConcurrencyLimiter {
    /// `per_key` is clamped to at least 1. A `global` of `Some(0)` would never grant anything;
    /// it is rejected by option validation before reaching here.
    pub fn new(per_key: usize, global: Option<usize>) -> Self {
        Self {
            state: Default::default(),
            per_key: per_key.max(1),
            global,
        }
    }

    /// At most one task per key, no global bound.
    pub fn single_flight() -> Self {
        Self::new(1, None)
    }

    pub fn per_key(&self) -> usize {
        self.per_key
    }

    pub fn global(&self) -> Option<usize> {
        self.global
    }

    /// Returns `None` if the key or the global bound is saturated.
    pub fn try_acquire(&self, key: &StreamKey) -> Option<Permit> {
        let mut state = self.lock();
        if let Some(global) = self.global {
            if state.total >= global {
                return None;
            }
        }
        let slot = state.slots.entry(key.clone()).or_default();
        if slot.active >= self.per_key {
            return None;
        }
        slot.active += 1;
        state.total += 1;
        Some(Permit {
            limiter: self.clone(),
            key: key.clone(),
        })
    }

    /// Record a wake-up for the key, to be picked up by whoever holds or next acquires a permit.
    pub fn notify(&self, key: &StreamKey) {
        self.lock().slots.entry(key.clone()).or_default().notified = true;
    }

    /// Fires when a global slot frees up while a wake-up of `key` is waiting for one.
    ///
    /// Without it, a wake-up turned away by the global bound would sit on the slot
    /// until the next wake-up of the same key.
    pub fn waker(&self, key: &StreamKey) -> Receiver<()> {
        let (sender, receiver) = flume::bounded(1);
        self.lock()
            .wakers
            .entry(key.clone())
            .or_default()
            .push(sender);
        receiver
    }

    pub fn is_notified(&self, key: &StreamKey) -> bool {
        self.lock().slots.get(key).map_or(false, |s| s.notified)
    }

    pub fn active(&self, key: &StreamKey) -> usize {
        self.lock().slots.get(key).map_or(0, |s| s.active)
    }

    pub fn total_active(&self) -> usize {
        self.lock().total
    }

    fn release(&self, key: &StreamKey) {
        let mut state = self.lock();
        let mut remove = false;
        if let Some(slot) = state.slots.get_mut(key) {
            slot.active = slot.active.saturating_sub(1);
            remove = slot.active == 0 && !slot.notified;
        }
        if remove {
            state.slots.remove(key);
        }
        state.total = state.total.saturating_sub(1);
        if self.global.is_some() {
            state.wake_waiting(key);
        }
    }

    fn take_notified(&self, key: &StreamKey) -> bool {
        match self.lock().slots.get_mut(key) {
            Some(slot) => std::mem::take(&mut slot.notified),
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        // nothing panics while holding the lock
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LimiterState {
    /// Fire the wakers of keys holding an unserved wake-up and no permit.
    /// The key just released is left to its own drainer.
    fn wake_waiting(&mut self, released: &StreamKey) {
        let LimiterState { slots, wakers, .. } = self;
        for (key, slot) in slots.iter() {
            if key == released || !slot.notified || slot.active > 0 {
                continue;
            }
            if let Some(senders) = wakers.get_mut(key) {
                senders.retain(|s| !matches!(s.try_send(()), Err(TrySendError::Disconnected(_))));
                if senders.is_empty() {
                    wakers.remove(key);
                }
            }
        }
    }
}

impl Permit {
    pub fn key(&self) -> &StreamKey {
        &self.key
    }

    /// Clear the wake-up mark of this key, returning whether it was set.
    pub fn take_notified(&self) -> bool {
        self.limiter.take_notified(&self.key)
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.limiter.release(&self.key);
    }
}
