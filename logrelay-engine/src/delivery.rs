use std::{collections::HashSet, fmt::Display};

use logrelay_types::{
    export::async_trait, ConsumerGroup, DeliveryErr, DeliveryHook, DeliveryPort, DeliveryResult,
    RecordId, StreamKey, StreamRecord, StreamResult, StreamStore,
};

/// Adapts a fire-and-forget hook into a confirming port: success confirms every submitted id.
#[derive(Debug)]
pub struct FireAndForget<H> {
    hook: H,
}

/// Fans a batch out to several ports. An id is confirmed only if every port confirmed it.
#[derive(Debug)]
pub struct AllOf {
    ports: Vec<Box<dyn DeliveryPort>>,
}

/// The outcome of delivering one batch and acknowledging what was confirmed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub submitted: usize,
    pub confirmed: usize,
    pub acked: u64,
    /// The port raised an error, so nothing was confirmed.
    pub port_failed: bool,
}

impl<H: DeliveryHook> FireAndForget<H> {
    pub fn new(hook: H) -> Self {
        Self { hook }
    }

    pub fn into_inner(self) -> H {
        self.hook
    }
}

#[async_trait]
impl<H: DeliveryHook> DeliveryPort for FireAndForget<H> {
    async fn deliver(&self, records: &[StreamRecord]) -> DeliveryResult<Vec<RecordId>> {
        self.hook.invoke(records).await?;
        Ok(records.iter().map(|r| *r.id()).collect())
    }
}

impl AllOf {
    pub fn new() -> Self {
        Self { ports: Vec::new() }
    }

    pub fn with<P: DeliveryPort + 'static>(mut self, port: P) -> Self {
        self.ports.push(Box::new(port));
        self
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

impl Default for AllOf {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryPort for AllOf {
    async fn deliver(&self, records: &[StreamRecord]) -> DeliveryResult<Vec<RecordId>> {
        if self.ports.is_empty() {
            return Err(DeliveryErr::Unavailable("no delivery port configured".to_owned()));
        }
        let mut confirmed: HashSet<RecordId> = records.iter().map(|r| *r.id()).collect();
        for port in self.ports.iter() {
            let ids: HashSet<RecordId> = port.deliver(records).await?.into_iter().collect();
            confirmed.retain(|id| ids.contains(id));
        }
        // keep stream order
        Ok(records
            .iter()
            .map(|r| *r.id())
            .filter(|id| confirmed.contains(id))
            .collect())
    }
}

/// Renders the id range of a batch for log messages.
#[derive(Debug)]
pub struct IdRange<'a>(pub &'a [StreamRecord]);

impl<'a> Display for IdRange<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.0.first(), self.0.last()) {
            (Some(first), Some(last)) if first.id() == last.id() => write!(f, "[{}]", first.id()),
            (Some(first), Some(last)) => write!(f, "[{}..={}]", first.id(), last.id()),
            _ => write!(f, "[]"),
        }
    }
}

/// Hand a batch to the port and acknowledge exactly the confirmed ids that belong to the batch.
///
/// A port error counts as zero confirmed. Unconfirmed ids stay pending for the reclaim scanner.
/// Errors from the store (while acknowledging) are returned.
pub(crate) async fn deliver_and_ack<S: StreamStore + ?Sized>(
    store: &S,
    port: &dyn DeliveryPort,
    stream: &StreamKey,
    group: &ConsumerGroup,
    records: &[StreamRecord],
) -> StreamResult<BatchReport, S::Error> {
    let mut report = BatchReport {
        submitted: records.len(),
        ..Default::default()
    };
    if records.is_empty() {
        return Ok(report);
    }
    let confirmed = match port.deliver(records).await {
        Ok(ids) => ids,
        Err(err) => {
            log::warn!(
                "Delivery of {} records {} from stream {stream} group {group} failed: {err}",
                records.len(),
                IdRange(records)
            );
            report.port_failed = true;
            Vec::new()
        }
    };

    let submitted: HashSet<RecordId> = records.iter().map(|r| *r.id()).collect();
    let mut seen = HashSet::with_capacity(confirmed.len());
    let mut to_ack = Vec::with_capacity(confirmed.len());
    for id in confirmed {
        if !submitted.contains(&id) {
            log::warn!("Port confirmed id {id} which is not part of the batch; ignored");
        } else if seen.insert(id) {
            to_ack.push(id);
        }
    }
    report.confirmed = to_ack.len();
    if !report.port_failed && report.confirmed < report.submitted {
        log::warn!(
            "Port confirmed {} of {} records {} from stream {stream} group {group}; the rest stay pending",
            report.confirmed,
            report.submitted,
            IdRange(records)
        );
    }

    if !to_ack.is_empty() {
        report.acked = match store.ack(stream, group, &to_ack).await {
            Ok(acked) => acked,
            Err(err) => {
                log::error!(
                    "Failed to ack {} records {} on stream {stream} group {group}: {err}",
                    to_ack.len(),
                    IdRange(records)
                );
                return Err(err);
            }
        };
    }
    Ok(report)
}
