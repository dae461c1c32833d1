//! Replica, message and cluster identities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(u32);

impl ReplicaId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ReplicaId {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Identifies one write: the replica that issued it plus a per-origin
/// sequence number starting at 1.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub origin: ReplicaId,
    pub seq: u64,
}

impl MessageId {
    pub const fn new(origin: ReplicaId, seq: u64) -> Self {
        Self { origin, seq }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.origin, self.seq)
    }
}

/// Fixed-size cluster as seen from one replica. Immutable for the process
/// lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Membership {
    local: ReplicaId,
    size: usize,
}

impl Membership {
    pub fn new(local: ReplicaId, size: usize) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::EmptyCluster);
        }
        if local.index() >= size {
            return Err(ConfigError::UnknownReplica {
                replica: local,
                size,
            });
        }
        Ok(Self { local, size })
    }

    pub fn local(&self) -> ReplicaId {
        self.local
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn check(&self, replica: ReplicaId) -> Result<(), ConfigError> {
        if replica.index() < self.size {
            Ok(())
        } else {
            Err(ConfigError::UnknownReplica {
                replica,
                size: self.size,
            })
        }
    }

    /// Every replica id in the cluster, self included, in ascending order.
    pub fn replicas(&self) -> impl Iterator<Item = ReplicaId> + use<> {
        (0..self.size as u32).map(ReplicaId::new)
    }
}

/// Consistency model selected at bootstrap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Total order over scalar Lamport clocks with all-to-all acks.
    Sequential,
    /// Causal order over vector clocks.
    Causal,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Sequential => "sequential",
            Mode::Causal => "causal",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown consistency mode `{0}` (expected sequential or causal)")]
pub struct ParseModeError(String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sequential" | "total" => Ok(Mode::Sequential),
            "causal" => Ok(Mode::Causal),
            _ => Err(ParseModeError(raw.to_string())),
        }
    }
}
