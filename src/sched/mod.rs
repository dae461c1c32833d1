//! Ordering scheduler: a bounded pending buffer drained by one loop that
//! admits tasks under either causal or total-order rules.

mod ack;
mod buffer;
mod causal;
mod engine;
mod error;
mod policy;
mod total;

pub use ack::{AckRecord, AckTracker};
pub use buffer::PendingBuffer;
pub use causal::CausalOrder;
pub use engine::{Executor, Scheduler, SchedulerStats};
pub use error::SchedulerError;
pub use policy::{AckOutcome, AckReceipt, Admission, Effect, OrderingPolicy};
pub use total::TotalOrder;

pub type CausalScheduler = Scheduler<CausalOrder>;
pub type TotalOrderScheduler = Scheduler<TotalOrder>;

impl CausalScheduler {
    /// Componentwise max of every clock sampled from peers.
    pub fn observed_timestamp(&self) -> crate::core::VectorTimestamp {
        self.inspect(|policy| policy.observed().clone())
    }
}

#[cfg(test)]
mod proptests;
