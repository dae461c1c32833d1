//! Per-message acknowledgment bitmaps for total-order delivery.

use std::collections::HashMap;

use crate::core::{ConfigError, MessageId, ReplicaId};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AckRecord {
    acked: Vec<bool>,
    count: usize,
}

impl AckRecord {
    fn new(size: usize) -> Self {
        Self {
            acked: vec![false; size],
            count: 0,
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_quorate(&self) -> bool {
        self.count == self.acked.len()
    }

    pub fn has_acked(&self, replica: ReplicaId) -> bool {
        self.acked.get(replica.index()).copied().unwrap_or(false)
    }

    pub fn acked_by(&self) -> Vec<ReplicaId> {
        self.acked
            .iter()
            .enumerate()
            .filter(|(_, acked)| **acked)
            .map(|(idx, _)| ReplicaId::new(idx as u32))
            .collect()
    }
}

/// Quorum here means every one of the N replicas, self included.
#[derive(Debug)]
pub struct AckTracker {
    size: usize,
    records: HashMap<MessageId, AckRecord>,
}

impl AckTracker {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            records: HashMap::new(),
        }
    }

    /// Records one ack. Idempotent; returns `true` only for the ack that
    /// completes the quorum.
    pub fn register_ack(
        &mut self,
        message: MessageId,
        replica: ReplicaId,
    ) -> Result<bool, ConfigError> {
        if replica.index() >= self.size {
            return Err(ConfigError::UnknownReplica {
                replica,
                size: self.size,
            });
        }
        let size = self.size;
        let record = self
            .records
            .entry(message)
            .or_insert_with(|| AckRecord::new(size));
        if record.acked[replica.index()] {
            return Ok(false);
        }
        record.acked[replica.index()] = true;
        record.count += 1;
        Ok(record.is_quorate())
    }

    pub fn is_quorate(&self, message: &MessageId) -> bool {
        self.records
            .get(message)
            .map(AckRecord::is_quorate)
            .unwrap_or(false)
    }

    pub fn record(&self, message: &MessageId) -> Option<&AckRecord> {
        self.records.get(message)
    }

    /// Drops the record once its message has been delivered.
    pub fn retire(&mut self, message: &MessageId) -> Option<AckRecord> {
        self.records.remove(message)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
