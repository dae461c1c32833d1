//! Core domain types.
//!
//! Module hierarchy follows type dependency order:
//! - identity: ReplicaId, MessageId, Membership, Mode
//! - timestamp: scalar and vector logical clocks
//! - task: Broadcast / Write / Ack task variants
//! - limits: per-replica resource bounds

pub mod error;
pub mod identity;
pub mod limits;
pub mod task;
pub mod timestamp;

pub use error::{ConfigError, ProtocolViolation};
pub use identity::{Membership, MessageId, Mode, ParseModeError, ReplicaId};
pub use limits::Limits;
pub use task::{Envelope, Outgoing, Task, TaskKind, WritePayload};
pub use timestamp::{
    CausalOrdering, LogicalClock, ScalarTimestamp, Stamp, Timestamp, VectorTimestamp,
};
