//! Shared scheduler loop.
//!
//! One mutex guards the ordering policy, the pending buffer and the sequence
//! counter, so every public operation is atomic with respect to the others.
//! The loop pops a ready task, asks the policy to admit it, and runs the
//! resulting effect synchronously with the lock released. Blocked tasks are
//! parked until the policy reports a state change.

use std::fmt;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::core::{
    ConfigError, Envelope, Limits, LogicalClock, Membership, MessageId, Outgoing, Task,
    WritePayload,
};

use super::buffer::PendingBuffer;
use super::policy::{AckOutcome, AckReceipt, Admission, Effect, OrderingPolicy};
use super::SchedulerError;

/// Runs the side effect of an admitted task.
pub trait Executor<C>: Send + Sync {
    fn execute(&self, effect: Effect<C>);
}

impl<C, F> Executor<C> for F
where
    F: Fn(Effect<C>) + Send + Sync,
{
    fn execute(&self, effect: Effect<C>) {
        self(effect)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub admitted: u64,
    pub parked: u64,
    pub wakeups: u64,
    pub rejected: u64,
}

struct EngineState<P: OrderingPolicy> {
    policy: P,
    buffer: PendingBuffer<Task<P::Clock>>,
    next_seq: u64,
    stopping: bool,
    stats: SchedulerStats,
}

impl<P: OrderingPolicy> EngineState<P> {
    fn ensure_running(&self) -> Result<(), SchedulerError> {
        if self.stopping {
            Err(SchedulerError::ShuttingDown)
        } else {
            Ok(())
        }
    }

    fn ensure_room(&self, additional: usize) -> Result<(), SchedulerError> {
        if self.buffer.has_room(additional) {
            Ok(())
        } else {
            Err(ConfigError::BufferFull {
                capacity: self.buffer.capacity(),
            }
            .into())
        }
    }

    fn wake_parked(&mut self) -> usize {
        let moved = self.buffer.wake();
        self.stats.wakeups += moved as u64;
        moved
    }

    /// Pops ready tasks until one is admitted or nothing is ready.
    fn next_effect(&mut self) -> Option<Effect<P::Clock>> {
        let local = self.policy.membership().local();
        while let Some(task) = self.buffer.pop() {
            let kind = task.kind();
            let message = task.message_id();
            match self.policy.admit(task) {
                Admission::Admitted { effect, wake } => {
                    self.stats.admitted += 1;
                    if let Effect::Apply(env) = &effect {
                        tracing::debug!(
                            replica = %local,
                            %message,
                            origin = %env.origin(),
                            clock = %env.timestamp,
                            local_clock = %self.policy.current(),
                            "delivered"
                        );
                    } else {
                        tracing::trace!(replica = %local, %message, kind = kind.as_str(), "admitted");
                    }
                    if wake {
                        self.wake_parked();
                    }
                    return Some(effect);
                }
                Admission::Blocked(task) => {
                    tracing::debug!(replica = %local, %message, kind = kind.as_str(), "blocked");
                    self.stats.parked += 1;
                    self.buffer.park(task);
                }
                Admission::Rejected { task, violation } => {
                    tracing::warn!(
                        replica = %local,
                        message = %task.message_id(),
                        "dropping task: {violation}"
                    );
                    self.stats.rejected += 1;
                }
            }
        }
        None
    }
}

struct Shared<P: OrderingPolicy> {
    state: Mutex<EngineState<P>>,
    ready: Condvar,
}

/// Cloneable handle to one replica's scheduler.
pub struct Scheduler<P: OrderingPolicy> {
    shared: Arc<Shared<P>>,
    membership: Membership,
}

impl<P: OrderingPolicy> Clone for Scheduler<P> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            membership: self.membership,
        }
    }
}

impl<P: OrderingPolicy> fmt::Debug for Scheduler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("mode", &P::Clock::MODE)
            .field("membership", &self.membership)
            .finish_non_exhaustive()
    }
}

impl<P: OrderingPolicy> Scheduler<P> {
    pub fn new(membership: Membership, limits: &Limits) -> Self {
        let state = EngineState {
            policy: P::new(membership),
            buffer: PendingBuffer::new(limits.buffer_capacity),
            next_seq: 0,
            stopping: false,
            stats: SchedulerStats::default(),
        };
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                ready: Condvar::new(),
            }),
            membership,
        }
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    fn lock(&self) -> MutexGuard<'_, EngineState<P>> {
        self.shared.state.lock().expect("scheduler lock poisoned")
    }

    /// Validates and buffers one task. Fails without side effects when the
    /// buffer is full.
    pub fn add_task(&self, task: Task<P::Clock>) -> Result<(), SchedulerError> {
        let mut state = self.lock();
        state.ensure_running()?;
        state.ensure_room(1)?;
        state.policy.enqueue(&task)?;
        state.buffer.push(task)?;
        drop(state);
        self.shared.ready.notify_one();
        Ok(())
    }

    /// Allocates the next local message id and buffers its broadcast task.
    /// The timestamp is assigned later, when the task is admitted.
    pub fn submit_write(&self, payload: WritePayload) -> Result<MessageId, SchedulerError> {
        let mut state = self.lock();
        state.ensure_running()?;
        state.ensure_room(1)?;
        let message_id = MessageId::new(self.membership.local(), state.next_seq + 1);
        let task = Task::Broadcast(Outgoing {
            message_id,
            payload,
        });
        state.policy.enqueue(&task)?;
        state.buffer.push(task)?;
        state.next_seq = message_id.seq;
        drop(state);
        self.shared.ready.notify_one();
        Ok(message_id)
    }

    /// Samples the write's clock and buffers every task it spawns, as one
    /// step.
    pub fn receive(&self, envelope: Envelope<P::Clock>) -> Result<(), SchedulerError> {
        let mut state = self.lock();
        state.ensure_running()?;
        state.ensure_room(P::TASKS_PER_RECEIVE)?;
        let tasks = state.policy.receive(envelope)?;
        for task in tasks {
            state.buffer.push(task)?;
        }
        drop(state);
        self.shared.ready.notify_one();
        Ok(())
    }

    pub fn current_timestamp(&self) -> P::Clock {
        self.lock().policy.current()
    }

    pub fn issue_timestamp(&self) -> Result<P::Clock, ConfigError> {
        self.lock().policy.issue()
    }

    pub fn on_external_clock_sample(&self, sample: &P::Clock) -> Result<(), SchedulerError> {
        self.lock().policy.observe(sample)
    }

    pub fn register_ack(
        &self,
        receipt: AckReceipt<P::Clock>,
    ) -> Result<AckOutcome, SchedulerError> {
        let mut state = self.lock();
        state.ensure_running()?;
        let outcome = state.policy.register_ack(&receipt)?;
        if outcome == AckOutcome::Quorate && state.wake_parked() > 0 {
            drop(state);
            self.shared.ready.notify_one();
        }
        Ok(outcome)
    }

    pub fn pending_len(&self) -> usize {
        self.lock().buffer.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.lock().stats
    }

    /// Read access to the policy under the scheduler lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&P) -> R) -> R {
        f(&self.lock().policy)
    }

    /// Admits at most one task and runs its effect. Returns `false` when
    /// nothing was admissible.
    pub fn step<E: Executor<P::Clock> + ?Sized>(&self, executor: &E) -> bool {
        let effect = self.lock().next_effect();
        match effect {
            Some(effect) => {
                executor.execute(effect);
                true
            }
            None => false,
        }
    }

    /// Processes every currently admissible task without blocking and
    /// returns how many effects ran.
    pub fn drain<E: Executor<P::Clock> + ?Sized>(&self, executor: &E) -> usize {
        let mut executed = 0;
        while self.step(executor) {
            executed += 1;
        }
        executed
    }

    /// Blocks, admitting tasks as they become ready, until [`Self::shutdown`].
    pub fn run<E: Executor<P::Clock> + ?Sized>(&self, executor: &E) {
        loop {
            let effect = {
                let mut state = self.lock();
                loop {
                    if state.stopping {
                        tracing::debug!(
                            replica = %self.membership.local(),
                            pending = state.buffer.len(),
                            "scheduler loop stopped"
                        );
                        return;
                    }
                    if let Some(effect) = state.next_effect() {
                        break effect;
                    }
                    state = self
                        .shared
                        .ready
                        .wait(state)
                        .expect("scheduler lock poisoned");
                }
            };
            executor.execute(effect);
        }
    }

    /// Runs the loop on a named background thread.
    pub fn spawn<E>(&self, executor: E) -> io::Result<JoinHandle<()>>
    where
        E: Executor<P::Clock> + 'static,
    {
        let scheduler = self.clone();
        thread::Builder::new()
            .name(format!("sched-{}", self.membership.local()))
            .spawn(move || scheduler.run(&executor))
    }

    /// Stops the loop after its current effect. Further submissions fail
    /// with [`SchedulerError::ShuttingDown`].
    pub fn shutdown(&self) {
        self.lock().stopping = true;
        self.shared.ready.notify_all();
    }

    pub fn is_stopping(&self) -> bool {
        self.lock().stopping
    }
}
