//! The seam between the shared scheduler loop and a consistency model.

use crate::core::{
    ConfigError, Envelope, Membership, MessageId, ProtocolViolation, ReplicaId, Task,
};
use crate::core::timestamp::LogicalClock;

use super::SchedulerError;

/// Side effect of an admitted task, executed by the loop outside the lock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect<C> {
    /// Fan the freshly stamped write out to every replica.
    Broadcast(Envelope<C>),
    /// Apply the write to the local store.
    Apply(Envelope<C>),
    /// Fan an acknowledgment of the write out to every replica.
    Acknowledge(Envelope<C>),
}

impl<C> Effect<C> {
    pub fn envelope(&self) -> &Envelope<C> {
        match self {
            Effect::Broadcast(env) | Effect::Apply(env) | Effect::Acknowledge(env) => env,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission<C> {
    Admitted {
        effect: Effect<C>,
        /// The admission changed state that parked tasks may be waiting on.
        wake: bool,
    },
    Blocked(Task<C>),
    /// The task can never be admitted under this model; the loop drops it.
    Rejected {
        task: Task<C>,
        violation: ProtocolViolation,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AckReceipt<C> {
    pub acker: ReplicaId,
    pub message_id: MessageId,
    /// Clock of the acknowledged message.
    pub clock: C,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AckOutcome {
    Recorded,
    /// This ack completed the quorum.
    Quorate,
    /// Repeat of an ack already recorded, or for a message already delivered.
    Duplicate,
}

/// Admission predicate and clock update rules for one consistency model.
///
/// Every method runs under the scheduler's single lock, so a method that
/// returns an error must leave its state untouched.
pub trait OrderingPolicy: Send + 'static {
    type Clock: LogicalClock;

    /// Most tasks a single [`OrderingPolicy::receive`] call can produce.
    const TASKS_PER_RECEIVE: usize;

    fn new(membership: Membership) -> Self;

    fn membership(&self) -> Membership;

    /// Latest locally committed clock.
    fn current(&self) -> Self::Clock;

    /// Advances the clock for a write originated here and returns the stamp.
    fn issue(&mut self) -> Result<Self::Clock, ConfigError>;

    /// Merges a peer's clock into local knowledge.
    fn observe(&mut self, sample: &Self::Clock) -> Result<(), SchedulerError>;

    /// Validates (and indexes) a task before it enters the buffer.
    fn enqueue(&mut self, task: &Task<Self::Clock>) -> Result<(), SchedulerError>;

    /// Turns a received write into the tasks it spawns, sampling its clock.
    fn receive(
        &mut self,
        envelope: Envelope<Self::Clock>,
    ) -> Result<Vec<Task<Self::Clock>>, SchedulerError>;

    fn register_ack(
        &mut self,
        receipt: &AckReceipt<Self::Clock>,
    ) -> Result<AckOutcome, SchedulerError>;

    /// Never fails: a task that may become admissible later comes back as
    /// `Blocked`.
    fn admit(&mut self, task: Task<Self::Clock>) -> Admission<Self::Clock>;
}
