#![forbid(unsafe_code)]

#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod replica;
pub mod sched;
pub mod store;
pub mod telemetry;
pub mod transport;

pub use error::{Effect, Error, Transience};
pub type Result<T> = std::result::Result<T, Error>;

// Re-export core types at crate root for convenience
pub use crate::core::{
    ConfigError, Envelope, Limits, LogicalClock, Membership, MessageId, Mode, ProtocolViolation,
    ReplicaId, ScalarTimestamp, Stamp, Task, Timestamp, VectorTimestamp, WritePayload,
};
pub use crate::replica::{Replica, ReplicaHandle};
pub use crate::sched::{CausalScheduler, Scheduler, TotalOrderScheduler};
pub use crate::store::KvStore;
