use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use logrelay_types::{
    AutoStreamReset, ConsumerInfo, GroupInfo, IdBound, PendingEntry, ReadBatch, RecordId,
    StreamErr, StreamKey, StreamRecord,
};

use crate::{MemoryErr, MemoryResult};

pub(crate) type Fields = Vec<(String, Vec<u8>)>;

/// One stream: its entries and the consumer groups reading it.
#[derive(Debug, Default)]
pub(crate) struct MemStream {
    entries: BTreeMap<RecordId, Fields>,
    last_id: RecordId,
    groups: BTreeMap<String, MemGroup>,
}

#[derive(Debug)]
struct MemGroup {
    last_delivered: RecordId,
    consumers: BTreeMap<String, Instant>,
    /// The Pending Entry List
    pel: BTreeMap<RecordId, Delivery>,
}

#[derive(Debug)]
struct Delivery {
    consumer: String,
    at: Instant,
    count: u64,
}

impl MemStream {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Append with an id greater than every id before it.
    pub fn append(&mut self, id: RecordId, fields: Fields) -> MemoryResult<RecordId> {
        if id <= self.last_id {
            return Err(StreamErr::Backend(MemoryErr::IdTooSmall(id, self.last_id)));
        }
        self.entries.insert(id, fields);
        self.last_id = id;
        Ok(id)
    }

    /// The next auto-generated id, given the wall clock in milliseconds.
    pub fn next_id(&self, millis: u64) -> RecordId {
        if millis > self.last_id.millis() {
            RecordId::from_millis(millis)
        } else {
            RecordId::new(self.last_id.millis(), self.last_id.seq() + 1)
        }
    }

    pub fn groups(&self) -> Vec<GroupInfo> {
        self.groups
            .iter()
            .map(|(name, group)| GroupInfo {
                name: name.clone(),
                consumers: group.consumers.len() as u64,
                pending: group.pel.len() as u64,
                last_delivered_id: Some(group.last_delivered),
            })
            .collect()
    }

    /// Returns false if the group already exists.
    pub fn create_group(&mut self, group: &str, reset: AutoStreamReset) -> bool {
        if self.groups.contains_key(group) {
            return false;
        }
        let last_delivered = match reset {
            AutoStreamReset::Earliest => RecordId::ZERO,
            AutoStreamReset::Latest => self.last_id,
        };
        self.groups.insert(
            group.to_owned(),
            MemGroup {
                last_delivered,
                consumers: Default::default(),
                pel: Default::default(),
            },
        );
        true
    }

    pub fn consumers(
        &self,
        key: &StreamKey,
        group: &str,
        now: Instant,
    ) -> MemoryResult<Vec<ConsumerInfo>> {
        let g = self.group(key, group)?;
        Ok(g.consumers
            .iter()
            .map(|(name, seen)| ConsumerInfo {
                name: name.clone(),
                pending: g.pel.values().filter(|d| &d.consumer == name).count() as u64,
                idle: now.saturating_duration_since(*seen),
            })
            .collect())
    }

    pub fn create_consumer(
        &mut self,
        key: &StreamKey,
        group: &str,
        consumer: &str,
        now: Instant,
    ) -> MemoryResult<bool> {
        let g = self.group_mut(key, group)?;
        if g.consumers.contains_key(consumer) {
            return Ok(false);
        }
        g.consumers.insert(consumer.to_owned(), now);
        Ok(true)
    }

    pub fn delete_consumer(
        &mut self,
        key: &StreamKey,
        group: &str,
        consumer: &str,
    ) -> MemoryResult<u64> {
        let g = self.group_mut(key, group)?;
        if g.consumers.remove(consumer).is_none() {
            return Ok(0);
        }
        let before = g.pel.len();
        g.pel.retain(|_, d| d.consumer != consumer);
        Ok((before - g.pel.len()) as u64)
    }

    /// The `>` read: never-delivered entries, assigned to `consumer`.
    pub fn read_group(
        &mut self,
        key: &StreamKey,
        group: &str,
        consumer: &str,
        count: usize,
        now: Instant,
    ) -> MemoryResult<ReadBatch> {
        let MemStream {
            entries, groups, ..
        } = self;
        let g = groups.get_mut(group).ok_or_else(|| group_not_found(key, group))?;
        g.consumers.insert(consumer.to_owned(), now);
        let mut batch = ReadBatch::default();
        let start = std::ops::Bound::Excluded(g.last_delivered);
        for (id, fields) in entries.range((start, std::ops::Bound::Unbounded)).take(count) {
            batch.read += 1;
            g.last_delivered = *id;
            g.pel.insert(
                *id,
                Delivery {
                    consumer: consumer.to_owned(),
                    at: now,
                    count: 1,
                },
            );
            if let Some(record) = to_record(key, *id, fields) {
                batch.records.push(record);
            }
        }
        Ok(batch)
    }

    pub fn pending(
        &self,
        key: &StreamKey,
        group: &str,
        start: IdBound,
        count: usize,
        now: Instant,
    ) -> MemoryResult<Vec<PendingEntry>> {
        let g = self.group(key, group)?;
        Ok(g.pel
            .iter()
            .filter(|(id, _)| start.admits_from(id))
            .take(count)
            .map(|(id, d)| PendingEntry {
                id: *id,
                consumer: d.consumer.clone(),
                idle: now.saturating_duration_since(d.at),
                delivery_count: d.count,
            })
            .collect())
    }

    pub fn claim(
        &mut self,
        key: &StreamKey,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[RecordId],
        now: Instant,
    ) -> MemoryResult<Vec<StreamRecord>> {
        let MemStream {
            entries, groups, ..
        } = self;
        let g = groups.get_mut(group).ok_or_else(|| group_not_found(key, group))?;
        g.consumers.insert(consumer.to_owned(), now);
        let mut records = Vec::new();
        for id in ids {
            let idle = match g.pel.get(id) {
                Some(d) => now.saturating_duration_since(d.at),
                None => continue,
            };
            if idle < min_idle {
                continue;
            }
            let fields = match entries.get(id) {
                Some(fields) => fields,
                None => {
                    // trimmed away while pending
                    g.pel.remove(id);
                    continue;
                }
            };
            if let Some(d) = g.pel.get_mut(id) {
                d.consumer = consumer.to_owned();
                d.at = now;
                d.count += 1;
            }
            if let Some(record) = to_record(key, *id, fields) {
                records.push(record);
            }
        }
        Ok(records)
    }

    pub fn ack(&mut self, key: &StreamKey, group: &str, ids: &[RecordId]) -> MemoryResult<u64> {
        let g = self.group_mut(key, group)?;
        Ok(ids.iter().filter(|id| g.pel.remove(id).is_some()).count() as u64)
    }

    /// Pending entries are left alone, like `XTRIM`.
    pub fn trim_before(&mut self, min_id: RecordId) -> u64 {
        let kept = self.entries.split_off(&min_id);
        let removed = self.entries.len();
        self.entries = kept;
        removed as u64
    }

    fn group(&self, key: &StreamKey, group: &str) -> MemoryResult<&MemGroup> {
        self.groups
            .get(group)
            .ok_or_else(|| group_not_found(key, group))
    }

    fn group_mut(&mut self, key: &StreamKey, group: &str) -> MemoryResult<&mut MemGroup> {
        self.groups
            .get_mut(group)
            .ok_or_else(|| group_not_found(key, group))
    }
}

pub(crate) fn group_not_found(key: &StreamKey, group: &str) -> StreamErr<MemoryErr> {
    StreamErr::GroupNotFound {
        stream: key.name().to_owned(),
        group: group.to_owned(),
    }
}

fn to_record(key: &StreamKey, id: RecordId, fields: &Fields) -> Option<StreamRecord> {
    match StreamRecord::from_fields(id, fields.iter().cloned()) {
        Ok(record) => Some(record),
        Err(err) => {
            log::warn!("Skipping malformed entry {id} of stream {key}: {err}");
            None
        }
    }
}
