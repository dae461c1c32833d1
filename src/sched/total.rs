//! Total-order delivery over scalar Lamport clocks.
//!
//! Every received write is acknowledged to every replica. A write is
//! delivered once all N replicas have acknowledged it and no known,
//! undelivered write sorts before it by `(clock, origin)`. All replicas
//! therefore apply writes in the same sequence.

use std::collections::{BTreeMap, HashMap};

use crate::core::{
    ConfigError, Envelope, Membership, MessageId, ProtocolViolation, ScalarTimestamp, Stamp,
    Task,
};

use super::ack::AckTracker;
use super::policy::{AckOutcome, AckReceipt, Admission, Effect, OrderingPolicy};
use super::SchedulerError;

/// How far past an origin's delivered sequence an ack may reach. Acks
/// ahead of their write are legitimate, but each one holds tracker state
/// until the write is delivered.
pub const ACK_WINDOW: u64 = 4096;

#[derive(Debug)]
pub struct TotalOrder {
    membership: Membership,
    clock: ScalarTimestamp,
    acks: AckTracker,
    /// Known, undelivered writes keyed by their total-order stamp.
    pending: BTreeMap<Stamp, MessageId>,
    /// Clock of every message seen via write or ack and not yet delivered.
    stamps: HashMap<MessageId, ScalarTimestamp>,
    /// Highest delivered sequence number per origin.
    delivered: Vec<u64>,
}

impl TotalOrder {
    pub fn acks(&self) -> &AckTracker {
        &self.acks
    }

    /// Stamp of the next write in line for delivery, if any is known.
    pub fn head(&self) -> Option<(Stamp, MessageId)> {
        self.pending.first_key_value().map(|(stamp, id)| (*stamp, *id))
    }

    fn delivered_seq(&self, message: &MessageId) -> u64 {
        self.delivered
            .get(message.origin.index())
            .copied()
            .unwrap_or(0)
    }

    fn check_write(&self, env: &Envelope<ScalarTimestamp>) -> Result<(), SchedulerError> {
        self.membership.check(env.origin())?;
        let id = env.message_id;
        if id.seq == 0 {
            return Err(ProtocolViolation::UnknownMessage {
                message: id,
                acker: env.origin(),
            }
            .into());
        }
        let stamp = Stamp::new(env.timestamp, env.origin());
        if id.seq <= self.delivered_seq(&id) || self.pending.contains_key(&stamp) {
            return Err(ProtocolViolation::DuplicateWrite { message: id }.into());
        }
        if let Some(recorded) = self.stamps.get(&id)
            && *recorded != env.timestamp
        {
            return Err(ProtocolViolation::AckClockMismatch {
                message: id,
                acker: env.origin(),
                expected: recorded.get(),
                got: env.timestamp.get(),
            }
            .into());
        }
        Ok(())
    }

    fn index_write(&mut self, env: &Envelope<ScalarTimestamp>) {
        self.pending
            .insert(Stamp::new(env.timestamp, env.origin()), env.message_id);
        self.stamps.insert(env.message_id, env.timestamp);
    }

    fn deliverable(&self, env: &Envelope<ScalarTimestamp>) -> bool {
        let stamp = Stamp::new(env.timestamp, env.origin());
        self.acks.is_quorate(&env.message_id)
            && self
                .pending
                .first_key_value()
                .is_some_and(|(head, id)| *head == stamp && *id == env.message_id)
    }
}

impl OrderingPolicy for TotalOrder {
    type Clock = ScalarTimestamp;

    const TASKS_PER_RECEIVE: usize = 2;

    fn new(membership: Membership) -> Self {
        Self {
            membership,
            clock: ScalarTimestamp::ZERO,
            acks: AckTracker::new(membership.size()),
            pending: BTreeMap::new(),
            stamps: HashMap::new(),
            delivered: vec![0; membership.size()],
        }
    }

    fn membership(&self) -> Membership {
        self.membership
    }

    fn current(&self) -> ScalarTimestamp {
        self.clock
    }

    fn issue(&mut self) -> Result<ScalarTimestamp, ConfigError> {
        self.clock = self.clock.increment();
        Ok(self.clock)
    }

    fn observe(&mut self, sample: &ScalarTimestamp) -> Result<(), SchedulerError> {
        self.clock = self.clock.receive(*sample);
        Ok(())
    }

    fn enqueue(&mut self, task: &Task<ScalarTimestamp>) -> Result<(), SchedulerError> {
        match task {
            Task::Broadcast(out) => {
                if out.message_id.origin != self.membership.local() {
                    return Err(ProtocolViolation::Misrouted {
                        receiver: out.message_id.origin,
                        local: self.membership.local(),
                    }
                    .into());
                }
                Ok(())
            }
            Task::Write(env) => {
                self.check_write(env)?;
                self.index_write(env);
                Ok(())
            }
            Task::Ack(env) => {
                self.membership.check(env.origin())?;
                Ok(())
            }
        }
    }

    fn receive(
        &mut self,
        envelope: Envelope<ScalarTimestamp>,
    ) -> Result<Vec<Task<ScalarTimestamp>>, SchedulerError> {
        self.check_write(&envelope)?;
        self.clock = self.clock.receive(envelope.timestamp);
        self.index_write(&envelope);
        Ok(vec![Task::Write(envelope.clone()), Task::Ack(envelope)])
    }

    fn register_ack(
        &mut self,
        receipt: &AckReceipt<ScalarTimestamp>,
    ) -> Result<AckOutcome, SchedulerError> {
        let id = receipt.message_id;
        self.membership.check(receipt.acker)?;
        self.membership.check(id.origin)?;
        if id.seq == 0 {
            return Err(ProtocolViolation::UnknownMessage {
                message: id,
                acker: receipt.acker,
            }
            .into());
        }
        let delivered = self.delivered_seq(&id);
        if id.seq <= delivered {
            self.clock = self.clock.receive(receipt.clock);
            return Ok(AckOutcome::Duplicate);
        }
        if id.seq - delivered > ACK_WINDOW {
            return Err(ProtocolViolation::AckBeyondWindow {
                message: id,
                acker: receipt.acker,
                delivered,
            }
            .into());
        }
        if let Some(recorded) = self.stamps.get(&id)
            && *recorded != receipt.clock
        {
            return Err(ProtocolViolation::AckClockMismatch {
                message: id,
                acker: receipt.acker,
                expected: recorded.get(),
                got: receipt.clock.get(),
            }
            .into());
        }

        let repeat = self
            .acks
            .record(&id)
            .is_some_and(|record| record.has_acked(receipt.acker));
        let quorate = self.acks.register_ack(id, receipt.acker)?;
        self.clock = self.clock.receive(receipt.clock);
        self.stamps.entry(id).or_insert(receipt.clock);

        Ok(if repeat {
            AckOutcome::Duplicate
        } else if quorate {
            AckOutcome::Quorate
        } else {
            AckOutcome::Recorded
        })
    }

    fn admit(&mut self, task: Task<ScalarTimestamp>) -> Admission<ScalarTimestamp> {
        match task {
            Task::Broadcast(out) => {
                self.clock = self.clock.increment();
                Admission::Admitted {
                    effect: Effect::Broadcast(Envelope {
                        message_id: out.message_id,
                        timestamp: self.clock,
                        payload: out.payload,
                    }),
                    wake: false,
                }
            }
            Task::Ack(env) => {
                // Sending the ack round is an event on the local clock.
                self.clock = self.clock.increment();
                Admission::Admitted {
                    effect: Effect::Acknowledge(env),
                    wake: false,
                }
            }
            Task::Write(env) => {
                if !self.deliverable(&env) {
                    return Admission::Blocked(Task::Write(env));
                }
                let id = env.message_id;
                self.pending.pop_first();
                self.acks.retire(&id);
                self.stamps.remove(&id);
                if let Some(seq) = self.delivered.get_mut(id.origin.index()) {
                    *seq = (*seq).max(id.seq);
                }
                Admission::Admitted {
                    effect: Effect::Apply(env),
                    wake: true,
                }
            }
        }
    }
}
