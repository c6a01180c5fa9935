use flume::Receiver;
use logrelay_runtime::sleep;
use logrelay_types::export::{
    async_trait,
    futures::{
        future::{select, Either},
        pin_mut,
    },
};
use std::time::{Duration, Instant};

#[async_trait]
/// The source of wake-ups for an active consumer.
pub trait Trigger: std::fmt::Debug + Send {
    /// Wait for the next wake-up. Returns false once the trigger is closed and will never fire again.
    ///
    /// Must be cancel safe: dropping the future must not lose a pending wake-up.
    async fn wait(&mut self) -> bool;
}

/// Fires immediately, then every `interval`.
#[derive(Debug)]
pub struct PollTrigger {
    interval: Duration,
    next: Option<Instant>,
}

/// Fires once on start, then once per received signal.
/// Signals queued while nobody was waiting are coalesced into one wake-up.
/// Closed when every sender has been dropped.
#[derive(Debug)]
pub struct SignalTrigger {
    receiver: Receiver<()>,
    started: bool,
}

/// Fires when either of the two triggers fires. Closed when both are.
#[derive(Debug)]
pub struct AnyTrigger<A, B> {
    a: Option<A>,
    b: Option<B>,
}

impl PollTrigger {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[async_trait]
impl Trigger for PollTrigger {
    async fn wait(&mut self) -> bool {
        let now = Instant::now();
        let next = *self.next.get_or_insert(now);
        if next > now {
            sleep(next - now).await;
        }
        self.next = Some(Instant::now() + self.interval);
        true
    }
}

impl SignalTrigger {
    pub fn new(receiver: Receiver<()>) -> Self {
        Self {
            receiver,
            started: false,
        }
    }
}

#[async_trait]
impl Trigger for SignalTrigger {
    async fn wait(&mut self) -> bool {
        if !self.started {
            // entries may have been appended while we were not listening
            self.started = true;
            return true;
        }
        match self.receiver.recv_async().await {
            Ok(()) => {
                self.receiver.drain().for_each(drop);
                true
            }
            Err(_) => false,
        }
    }
}

impl<A, B> AnyTrigger<A, B> {
    pub fn new(a: A, b: B) -> Self {
        Self {
            a: Some(a),
            b: Some(b),
        }
    }
}

#[async_trait]
impl<A: Trigger, B: Trigger> Trigger for AnyTrigger<A, B> {
    async fn wait(&mut self) -> bool {
        loop {
            let fired = match (self.a.as_mut(), self.b.as_mut()) {
                (Some(a), Some(b)) => {
                    let (fa, fb) = (a.wait(), b.wait());
                    pin_mut!(fa);
                    pin_mut!(fb);
                    match select(fa, fb).await {
                        Either::Left((fired, _)) => Either::Left(fired),
                        Either::Right((fired, _)) => Either::Right(fired),
                    }
                }
                (Some(a), None) => return a.wait().await,
                (None, Some(b)) => return b.wait().await,
                (None, None) => return false,
            };
            match fired {
                Either::Left(true) | Either::Right(true) => return true,
                Either::Left(false) => {
                    log::debug!("Trigger {:?} closed", self.a);
                    self.a = None;
                }
                Either::Right(false) => {
                    log::debug!("Trigger {:?} closed", self.b);
                    self.b = None;
                }
            }
        }
    }
}

#[async_trait]
impl<T: Trigger + ?Sized> Trigger for Box<T> {
    async fn wait(&mut self) -> bool {
        (**self).wait().await
    }
}
