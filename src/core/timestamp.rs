//! Logical timestamps: scalar Lamport clocks for total order, vector
//! clocks for causal order.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::ConfigError;
use super::identity::{Mode, ReplicaId};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScalarTimestamp(u64);

impl ScalarTimestamp {
    pub const ZERO: ScalarTimestamp = ScalarTimestamp(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn increment(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Lamport receive rule: `max(local, received) + 1`.
    #[must_use]
    pub fn receive(self, received: ScalarTimestamp) -> Self {
        self.max(received).increment()
    }
}

impl fmt::Display for ScalarTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Composite total-order key. Field order makes the derived `Ord` compare
/// by clock first and break ties on the originating replica, so every
/// replica sorts equal clocks identically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp {
    pub clock: ScalarTimestamp,
    pub origin: ReplicaId,
}

impl Stamp {
    pub const fn new(clock: ScalarTimestamp, origin: ReplicaId) -> Self {
        Self { clock, origin }
    }
}

impl fmt::Display for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.clock, self.origin)
    }
}

/// Result of comparing two vector timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CausalOrdering {
    Before,
    Equal,
    After,
    Concurrent,
}

impl CausalOrdering {
    pub fn partial(self) -> Option<Ordering> {
        match self {
            CausalOrdering::Before => Some(Ordering::Less),
            CausalOrdering::Equal => Some(Ordering::Equal),
            CausalOrdering::After => Some(Ordering::Greater),
            CausalOrdering::Concurrent => None,
        }
    }
}

/// One counter per replica, indexed by replica id.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorTimestamp(Vec<u64>);

impl VectorTimestamp {
    pub fn zero(size: usize) -> Self {
        Self(vec![0; size])
    }

    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self(counts)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    pub fn get(&self, replica: ReplicaId) -> Result<u64, ConfigError> {
        self.0
            .get(replica.index())
            .copied()
            .ok_or(ConfigError::UnknownReplica {
                replica,
                size: self.0.len(),
            })
    }

    /// New timestamp with the owner's component bumped by one.
    pub fn increment(&self, owner: ReplicaId) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        next.bump(owner)?;
        Ok(next)
    }

    pub(crate) fn bump(&mut self, owner: ReplicaId) -> Result<u64, ConfigError> {
        let size = self.0.len();
        let slot = self
            .0
            .get_mut(owner.index())
            .ok_or(ConfigError::UnknownReplica {
                replica: owner,
                size,
            })?;
        *slot = slot.saturating_add(1);
        Ok(*slot)
    }

    /// Componentwise maximum.
    pub fn merge(&self, other: &Self) -> Result<Self, ConfigError> {
        self.check_dimension(other)?;
        Ok(Self(
            self.0
                .iter()
                .zip(&other.0)
                .map(|(a, b)| (*a).max(*b))
                .collect(),
        ))
    }

    pub fn compare(&self, other: &Self) -> Result<CausalOrdering, ConfigError> {
        self.check_dimension(other)?;
        let mut less = false;
        let mut greater = false;
        for (a, b) in self.0.iter().zip(&other.0) {
            match a.cmp(b) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
        }
        Ok(match (less, greater) {
            (false, false) => CausalOrdering::Equal,
            (true, false) => CausalOrdering::Before,
            (false, true) => CausalOrdering::After,
            (true, true) => CausalOrdering::Concurrent,
        })
    }

    /// `self <= other` in every component.
    pub fn dominated_by(&self, other: &Self) -> Result<bool, ConfigError> {
        Ok(matches!(
            self.compare(other)?,
            CausalOrdering::Before | CausalOrdering::Equal
        ))
    }

    pub fn check_dimension(&self, other: &Self) -> Result<(), ConfigError> {
        if self.0.len() == other.0.len() {
            Ok(())
        } else {
            Err(ConfigError::DimensionMismatch {
                left: self.0.len(),
                right: other.0.len(),
            })
        }
    }
}

impl fmt::Debug for VectorTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

impl fmt::Display for VectorTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

/// Wire form of either clock kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Timestamp {
    Scalar(ScalarTimestamp),
    Vector(VectorTimestamp),
}

impl Timestamp {
    pub fn mode(&self) -> Mode {
        match self {
            Timestamp::Scalar(_) => Mode::Sequential,
            Timestamp::Vector(_) => Mode::Causal,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Scalar(ts) => write!(f, "{ts}"),
            Timestamp::Vector(ts) => write!(f, "{ts}"),
        }
    }
}

impl From<ScalarTimestamp> for Timestamp {
    fn from(value: ScalarTimestamp) -> Self {
        Timestamp::Scalar(value)
    }
}

impl From<VectorTimestamp> for Timestamp {
    fn from(value: VectorTimestamp) -> Self {
        Timestamp::Vector(value)
    }
}

/// Conversion between a mode's clock type and the wire form.
pub trait LogicalClock: Clone + fmt::Debug + fmt::Display + PartialEq + Send + 'static {
    const MODE: Mode;

    fn to_wire(&self) -> Timestamp;

    fn from_wire(ts: Timestamp) -> Result<Self, ConfigError>;
}

impl LogicalClock for ScalarTimestamp {
    const MODE: Mode = Mode::Sequential;

    fn to_wire(&self) -> Timestamp {
        Timestamp::Scalar(*self)
    }

    fn from_wire(ts: Timestamp) -> Result<Self, ConfigError> {
        match ts {
            Timestamp::Scalar(ts) => Ok(ts),
            other => Err(ConfigError::ModeMismatch {
                expected: Mode::Sequential,
                got: other.mode(),
            }),
        }
    }
}

impl LogicalClock for VectorTimestamp {
    const MODE: Mode = Mode::Causal;

    fn to_wire(&self) -> Timestamp {
        Timestamp::Vector(self.clone())
    }

    fn from_wire(ts: Timestamp) -> Result<Self, ConfigError> {
        match ts {
            Timestamp::Vector(ts) => Ok(ts),
            other => Err(ConfigError::ModeMismatch {
                expected: Mode::Causal,
                got: other.mode(),
            }),
        }
    }
}
