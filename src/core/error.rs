//! Configuration and protocol error taxonomy shared by the scheduler,
//! the replica service and the wire layer.

use thiserror::Error;

use super::identity::{MessageId, Mode, ReplicaId};
use crate::error::{Effect, Transience};

/// Cluster misconfiguration. Fatal for the operation that hit it and never
/// retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("vector timestamp dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("replica {replica} is not part of a {size}-replica cluster")]
    UnknownReplica { replica: ReplicaId, size: usize },

    #[error("pending buffer capacity {capacity} exceeded")]
    BufferFull { capacity: usize },

    #[error("timestamp for {got} mode received by a {expected} replica")]
    ModeMismatch { expected: Mode, got: Mode },

    #[error("cluster must contain at least one replica")]
    EmptyCluster,

    #[error("invalid limit {field}: {reason}")]
    InvalidLimit { field: &'static str, reason: String },
}

/// A peer sent something the ordering protocol cannot accept. Surfaced to
/// the sender and logged; never replayed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("write {message} from {origin} is stale: clock component {got} already delivered through {delivered}")]
    StaleWrite {
        message: MessageId,
        origin: ReplicaId,
        got: u64,
        delivered: u64,
    },

    #[error("write {message} was already received")]
    DuplicateWrite { message: MessageId },

    #[error("ack from {acker} references unknown message {message}")]
    UnknownMessage { message: MessageId, acker: ReplicaId },

    #[error("ack from {acker} for {message} is beyond the window: origin delivered through {delivered}")]
    AckBeyondWindow {
        message: MessageId,
        acker: ReplicaId,
        delivered: u64,
    },

    #[error("ack from {acker} for {message} carries clock {got}, expected {expected}")]
    AckClockMismatch {
        message: MessageId,
        acker: ReplicaId,
        expected: u64,
        got: u64,
    },

    #[error("ack from {acker} for {message} received in causal mode")]
    UnexpectedAck { message: MessageId, acker: ReplicaId },

    #[error("message addressed to replica {receiver} delivered to replica {local}")]
    Misrouted { receiver: ReplicaId, local: ReplicaId },

    #[error("write {message} relayed by {sender}, which is not its origin")]
    OriginMismatch { message: MessageId, sender: ReplicaId },
}

impl ConfigError {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}

impl ProtocolViolation {
    pub fn transience(&self) -> Transience {
        Transience::Permanent
    }

    pub fn effect(&self) -> Effect {
        Effect::None
    }
}
