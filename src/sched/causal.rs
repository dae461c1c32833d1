//! Causal delivery over vector clocks.
//!
//! A write from sender `s` stamped `T` is admissible against the delivered
//! clock `G` iff `T[s] == G[s] + 1` and `T[j] <= G[j]` for every `j != s`:
//! it is the next write expected from `s` and everything it depends on has
//! already been delivered here.
//!
//! The local component of `G` counts writes issued here, while their
//! self-addressed copies may still be in flight. Dependencies on local
//! writes are therefore checked against the count of own writes actually
//! applied, so a peer's write never overtakes the local write it read.

use std::collections::HashSet;

use crate::core::{
    ConfigError, Envelope, Membership, MessageId, Outgoing, ProtocolViolation, Task,
    VectorTimestamp,
};

use super::policy::{AckOutcome, AckReceipt, Admission, Effect, OrderingPolicy};
use super::SchedulerError;

#[derive(Debug)]
pub struct CausalOrder {
    membership: Membership,
    /// Writes delivered per origin. Component `local` counts writes issued
    /// here, which are delivered at issue time.
    clock: VectorTimestamp,
    /// Own writes applied to the store (their self-addressed copies).
    applied_local: u64,
    /// Componentwise max of every clock sampled from peers. Diagnostics only;
    /// never consulted by the predicate.
    observed: VectorTimestamp,
    pending: HashSet<MessageId>,
}

impl CausalOrder {
    pub fn observed(&self) -> &VectorTimestamp {
        &self.observed
    }

    fn check_write(&self, env: &Envelope<VectorTimestamp>) -> Result<(), SchedulerError> {
        let origin = env.origin();
        self.membership.check(origin)?;
        env.timestamp.check_dimension(&self.clock)?;
        if self.pending.contains(&env.message_id) {
            return Err(ProtocolViolation::DuplicateWrite {
                message: env.message_id,
            }
            .into());
        }

        let got = env.timestamp.get(origin)?;
        let delivered = if origin == self.membership.local() {
            self.applied_local
        } else {
            self.clock.get(origin)?
        };
        if got <= delivered {
            return Err(ProtocolViolation::StaleWrite {
                message: env.message_id,
                origin,
                got,
                delivered,
            }
            .into());
        }
        Ok(())
    }

    fn deliverable(&self, env: &Envelope<VectorTimestamp>) -> bool {
        let sender = env.origin().index();
        let t = env.timestamp.as_slice();
        let g = self.clock.as_slice();
        if t.len() != g.len() || sender >= t.len() {
            return false;
        }
        if env.origin() == self.membership.local() {
            // Dependencies were delivered before the write was issued.
            return t[sender] == self.applied_local + 1;
        }
        let local = self.membership.local().index();
        t[sender] == g[sender] + 1
            && t.iter().zip(g).enumerate().all(|(j, (tj, gj))| {
                if j == sender {
                    true
                } else if j == local {
                    *tj <= self.applied_local
                } else {
                    tj <= gj
                }
            })
    }

    fn stamp_outgoing(&mut self, out: Outgoing) -> Admission<VectorTimestamp> {
        match self.issue() {
            Ok(timestamp) => Admission::Admitted {
                effect: Effect::Broadcast(Envelope {
                    message_id: out.message_id,
                    timestamp,
                    payload: out.payload,
                }),
                wake: false,
            },
            Err(err) => {
                tracing::error!(message = %out.message_id, "cannot stamp outgoing write: {err}");
                Admission::Blocked(Task::Broadcast(out))
            }
        }
    }
}

impl OrderingPolicy for CausalOrder {
    type Clock = VectorTimestamp;

    const TASKS_PER_RECEIVE: usize = 1;

    fn new(membership: Membership) -> Self {
        Self {
            membership,
            clock: VectorTimestamp::zero(membership.size()),
            applied_local: 0,
            observed: VectorTimestamp::zero(membership.size()),
            pending: HashSet::new(),
        }
    }

    fn membership(&self) -> Membership {
        self.membership
    }

    fn current(&self) -> VectorTimestamp {
        self.clock.clone()
    }

    fn issue(&mut self) -> Result<VectorTimestamp, ConfigError> {
        let next = self.clock.increment(self.membership.local())?;
        self.clock = next.clone();
        Ok(next)
    }

    fn observe(&mut self, sample: &VectorTimestamp) -> Result<(), SchedulerError> {
        self.observed = self.observed.merge(sample)?;
        Ok(())
    }

    fn enqueue(&mut self, task: &Task<VectorTimestamp>) -> Result<(), SchedulerError> {
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
                self.pending.insert(env.message_id);
                Ok(())
            }
            Task::Ack(env) => Err(ProtocolViolation::UnexpectedAck {
                message: env.message_id,
                acker: self.membership.local(),
            }
            .into()),
        }
    }

    fn receive(
        &mut self,
        envelope: Envelope<VectorTimestamp>,
    ) -> Result<Vec<Task<VectorTimestamp>>, SchedulerError> {
        self.check_write(&envelope)?;
        self.observed = self.observed.merge(&envelope.timestamp)?;
        self.pending.insert(envelope.message_id);
        Ok(vec![Task::Write(envelope)])
    }

    fn register_ack(
        &mut self,
        receipt: &AckReceipt<VectorTimestamp>,
    ) -> Result<AckOutcome, SchedulerError> {
        Err(ProtocolViolation::UnexpectedAck {
            message: receipt.message_id,
            acker: receipt.acker,
        }
        .into())
    }

    fn admit(&mut self, task: Task<VectorTimestamp>) -> Admission<VectorTimestamp> {
        match task {
            Task::Broadcast(out) => self.stamp_outgoing(out),
            Task::Write(env) => {
                if !self.deliverable(&env) {
                    return Admission::Blocked(Task::Write(env));
                }
                let origin = env.origin();
                if origin == self.membership.local() {
                    self.applied_local += 1;
                } else if let Err(err) = self.clock.bump(origin) {
                    tracing::error!(message = %env.message_id, "cannot advance clock: {err}");
                    return Admission::Blocked(Task::Write(env));
                }
                self.pending.remove(&env.message_id);
                Admission::Admitted {
                    effect: Effect::Apply(env),
                    wake: true,
                }
            }
            Task::Ack(env) => Admission::Rejected {
                task: Task::Ack(env.clone()),
                violation: ProtocolViolation::UnexpectedAck {
                    message: env.message_id,
                    acker: self.membership.local(),
                },
            },
        }
    }
}
