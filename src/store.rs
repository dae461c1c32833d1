//! Local key-value state. The scheduler writes to it only through [`Apply`],
//! once per delivered write.

use std::collections::{BTreeMap, VecDeque};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::core::{Envelope, LogicalClock, MessageId, ReplicaId, Timestamp};

/// Callback invoked for each delivered write, in delivery order.
pub trait Apply: Send + Sync {
    fn apply(&self, write: AppliedWrite);
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedWrite {
    pub message_id: MessageId,
    pub key: String,
    pub value: String,
    pub timestamp: Timestamp,
}

impl AppliedWrite {
    pub fn from_envelope<C: LogicalClock>(env: &Envelope<C>) -> Self {
        Self {
            message_id: env.message_id,
            key: env.payload.key.clone(),
            value: env.payload.value.clone(),
            timestamp: env.timestamp.to_wire(),
        }
    }

    pub fn origin(&self) -> ReplicaId {
        self.message_id.origin
    }
}

/// Applied writes retained for [`KvStore::history`] by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 65_536;

#[derive(Debug, Default)]
struct StoreInner {
    entries: BTreeMap<String, String>,
    history: VecDeque<AppliedWrite>,
    applied: usize,
}

/// Last-delivered-wins map plus a bounded log of the most recently
/// applied writes.
#[derive(Debug)]
pub struct KvStore {
    inner: RwLock<StoreInner>,
    history_limit: usize,
}

impl Default for KvStore {
    fn default() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }
}

impl KvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `limit` writes in the history. Zero disables it.
    pub fn with_history_limit(limit: usize) -> Self {
        Self {
            inner: RwLock::new(StoreInner::default()),
            history_limit: limit,
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.inner
            .read()
            .expect("store lock poisoned")
            .entries
            .get(key)
            .cloned()
    }

    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.inner.read().expect("store lock poisoned").entries.clone()
    }

    /// The most recent applied writes, oldest first. Diagnostics only: the
    /// oldest entries are dropped once the history limit is reached.
    pub fn history(&self) -> Vec<AppliedWrite> {
        let inner = self.inner.read().expect("store lock poisoned");
        inner.history.iter().cloned().collect()
    }

    /// Count of every write applied, including those dropped from history.
    pub fn applied_len(&self) -> usize {
        self.inner.read().expect("store lock poisoned").applied
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("store lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Apply for KvStore {
    fn apply(&self, write: AppliedWrite) {
        let mut inner = self.inner.write().expect("store lock poisoned");
        inner
            .entries
            .insert(write.key.clone(), write.value.clone());
        inner.applied += 1;
        if self.history_limit == 0 {
            return;
        }
        if inner.history.len() == self.history_limit {
            inner.history.pop_front();
        }
        inner.history.push_back(write);
    }
}
