//! Partitioned append-only topic.
//!
//! Records land on a partition chosen by hashing their key and stay there
//! for the life of the process. Subscriptions are per-partition offset
//! cursors: attaching after records were published replays them from the
//! beginning, which is what decouples publisher and consumer lifetimes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use tokio::sync::Notify;

/// One record on a partition log.
#[derive(Debug, Clone)]
pub struct Record {
    pub key: String,
    pub payload: Bytes,
    pub offset: u64,
}

struct Partition {
    records: Mutex<Vec<Record>>,
    appended: Notify,
}

impl Partition {
    fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            appended: Notify::new(),
        }
    }
}

/// A named topic with a fixed partition count.
pub struct Topic {
    name: String,
    partitions: Vec<Arc<Partition>>,
}

impl Topic {
    pub fn new(name: impl Into<String>, partitions: usize) -> Self {
        let count = partitions.max(1);
        Self {
            name: name.into(),
            partitions: (0..count).map(|_| Arc::new(Partition::new())).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Partition a key routes to. Stable for the topic's lifetime, so
    /// every record of one transfer is co-located.
    pub fn partition_for(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.partitions.len() as u64) as usize
    }

    /// Append a record, waking any consumer waiting on its partition.
    /// Returns (partition, offset).
    pub fn publish(&self, key: &str, payload: Bytes) -> (usize, u64) {
        let index = self.partition_for(key);
        let partition = &self.partitions[index];

        let offset = {
            let mut records = partition.records.lock().unwrap();
            let offset = records.len() as u64;
            records.push(Record {
                key: key.to_owned(),
                payload,
                offset,
            });
            offset
        };
        partition.appended.notify_waiters();

        tracing::trace!(topic = %self.name, partition = index, offset, key, "record published");
        (index, offset)
    }

    /// Cursor over one partition, starting from the earliest record.
    pub fn subscribe(&self, partition: usize) -> Subscription {
        Subscription {
            partition: self.partitions[partition].clone(),
            next: 0,
        }
    }
}

/// Per-partition offset cursor. Each subscription owns its position;
/// two subscriptions on the same partition each see every record.
pub struct Subscription {
    partition: Arc<Partition>,
    next: usize,
}

impl Subscription {
    /// Next record if one is already on the log.
    pub fn try_poll(&mut self) -> Option<Record> {
        let records = self.partition.records.lock().unwrap();
        let record = records.get(self.next).cloned()?;
        self.next += 1;
        Some(record)
    }

    /// Wait for the next record. Cancel-safe: the cursor only advances
    /// when a record is returned.
    pub async fn poll(&mut self) -> Record {
        loop {
            if let Some(record) = self.try_poll() {
                return record;
            }
            let partition = self.partition.clone();
            let appended = partition.appended.notified();
            tokio::pin!(appended);
            // register interest before the re-check so a publish landing
            // in between cannot be missed
            appended.as_mut().enable();
            if let Some(record) = self.try_poll() {
                return record;
            }
            appended.await;
        }
    }
}
