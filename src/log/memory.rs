//! In-memory event log.
//!
//! Keeps the contract that matters to the rest of the system: records
//! are partitioned by the FNV-1a hash of their key, and order is
//! preserved within a partition. Tests replay the stored records through
//! the applier, as many times as they like; redelivery is the
//! interesting case.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use super::traits::{EventSink, LogError};
use crate::router::fnv1a_32;

/// One record as stored on a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
    pub key: String,
    pub payload: Vec<u8>,
}

pub struct MemoryLog {
    partition_count: u32,
    // topic -> partition -> records in publication order
    topics: RwLock<HashMap<String, Vec<Vec<StoredRecord>>>>,
    available: AtomicBool,
}

impl MemoryLog {
    #[must_use]
    pub fn new(partition_count: u32) -> Self {
        assert!(partition_count > 0, "log requires at least one partition");
        Self {
            partition_count,
            topics: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Partition a key lands on; same rule for every publish.
    #[must_use]
    pub fn partition_for(&self, key: &str) -> u32 {
        fnv1a_32(key.as_bytes()) % self.partition_count
    }

    /// Simulate the log being unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Records of a topic in consumption order (partition-major; order
    /// within a partition is publication order).
    #[must_use]
    pub fn records(&self, topic: &str) -> Vec<StoredRecord> {
        let topics = self.topics.read();
        topics
            .get(topic)
            .map(|partitions| partitions.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Per-partition view of a topic.
    #[must_use]
    pub fn partitions(&self, topic: &str) -> Vec<Vec<StoredRecord>> {
        let topics = self.topics.read();
        topics.get(topic).cloned().unwrap_or_default()
    }

    /// Total record count on a topic.
    #[must_use]
    pub fn len(&self, topic: &str) -> usize {
        self.records(topic).len()
    }

    #[must_use]
    pub fn is_empty(&self, topic: &str) -> bool {
        self.len(topic) == 0
    }
}

#[async_trait]
impl EventSink for MemoryLog {
    async fn publish(&self, topic: &str, key: &str, payload: &[u8]) -> Result<(), LogError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(LogError::Publish("log unreachable".into()));
        }

        let partition = self.partition_for(key) as usize;
        let mut topics = self.topics.write();
        let partitions = topics
            .entry(topic.to_string())
            .or_insert_with(|| vec![Vec::new(); self.partition_count as usize]);
        partitions[partition].push(StoredRecord {
            key: key.to_string(),
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
