//! One replica: request handlers in front of the scheduler, and the
//! executor that carries admitted effects out to peers and the local store.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam::channel;

use crate::core::{
    Envelope, Limits, LogicalClock, Membership, MessageId, ProtocolViolation, ReplicaId,
    Timestamp, WritePayload,
};
use crate::sched::{
    AckOutcome, AckReceipt, Effect, Executor, OrderingPolicy, Scheduler, SchedulerError,
};
use crate::store::{AppliedWrite, Apply, KvStore};
use crate::transport::{
    Handler, ReplicaState, ReplicaStatus, Request, Response, ServerHandle, StatusCode,
    Transport, TransportError,
};

pub struct Replica<P: OrderingPolicy> {
    scheduler: Scheduler<P>,
    store: Arc<KvStore>,
}

impl<P: OrderingPolicy> Replica<P> {
    pub fn new(membership: Membership, limits: &Limits) -> Self {
        Self::with_store(membership, limits, Arc::new(KvStore::new()))
    }

    pub fn with_store(membership: Membership, limits: &Limits, store: Arc<KvStore>) -> Self {
        Self {
            scheduler: Scheduler::new(membership, limits),
            store,
        }
    }

    pub fn id(&self) -> ReplicaId {
        self.scheduler.membership().local()
    }

    pub fn membership(&self) -> Membership {
        self.scheduler.membership()
    }

    pub fn scheduler(&self) -> &Scheduler<P> {
        &self.scheduler
    }

    pub fn store(&self) -> &Arc<KvStore> {
        &self.store
    }

    /// Client write: allocate an id and queue the broadcast.
    pub fn handle_write(&self, payload: WritePayload) -> Result<MessageId, SchedulerError> {
        self.scheduler.submit_write(payload)
    }

    /// A stamped write fanned out by its origin, possibly this replica.
    pub fn handle_broadcast(
        &self,
        sender: ReplicaId,
        message_id: MessageId,
        timestamp: Timestamp,
        payload: WritePayload,
    ) -> Result<(), SchedulerError> {
        self.membership().check(sender)?;
        if sender != message_id.origin {
            return Err(ProtocolViolation::OriginMismatch {
                message: message_id,
                sender,
            }
            .into());
        }
        let timestamp = P::Clock::from_wire(timestamp)?;
        self.scheduler.receive(Envelope {
            message_id,
            timestamp,
            payload,
        })
    }

    pub fn handle_ack(
        &self,
        sender: ReplicaId,
        message_id: MessageId,
        timestamp: Timestamp,
    ) -> Result<AckOutcome, SchedulerError> {
        let clock = P::Clock::from_wire(timestamp)?;
        self.scheduler.register_ack(AckReceipt {
            acker: sender,
            message_id,
            clock,
        })
    }

    pub fn status(&self) -> ReplicaStatus {
        ReplicaStatus {
            replica: self.id(),
            mode: P::Clock::MODE,
            clock: self.scheduler.current_timestamp().to_wire(),
            pending: self.scheduler.pending_len(),
            applied: self.store.applied_len(),
            admitted: 0,
            parked: 0,
            wakeups: 0,
        }
        .with_stats(self.scheduler.stats())
    }

    /// Spawns the scheduler loop and reports `Ready` to the coordinator.
    pub fn start<T>(
        self: &Arc<Self>,
        transport: T,
        fanout_parallelism: usize,
        coordinator: Option<Arc<dyn Coordinator>>,
    ) -> io::Result<ReplicaHandle<P>>
    where
        T: Transport + 'static,
    {
        let executor = ReplicaExecutor {
            membership: self.membership(),
            transport,
            store: Arc::clone(&self.store),
            fanout_parallelism,
        };
        let join = self.scheduler.spawn(executor)?;
        tracing::info!(replica = %self.id(), mode = %P::Clock::MODE, "replica started");
        if let Some(coordinator) = &coordinator {
            report(coordinator.as_ref(), self.id(), ReplicaState::Ready);
        }
        Ok(ReplicaHandle {
            replica: Arc::clone(self),
            join: Some(join),
            server: None,
            coordinator,
        })
    }

    fn check_receiver(&self, receiver: ReplicaId) -> Result<(), SchedulerError> {
        if receiver == self.id() {
            Ok(())
        } else {
            Err(ProtocolViolation::Misrouted {
                receiver,
                local: self.id(),
            }
            .into())
        }
    }

    fn respond(&self, request: Request) -> Result<Response, SchedulerError> {
        if let Some(receiver) = request.receiver() {
            self.check_receiver(receiver)?;
        }
        match request {
            Request::Write { key, value } => {
                let id = self.handle_write(WritePayload::new(key, value))?;
                Ok(Response::accepted(id))
            }
            Request::Broadcast {
                sender,
                message_id,
                timestamp,
                key,
                value,
                ..
            } => {
                self.handle_broadcast(sender, message_id, timestamp, WritePayload::new(key, value))?;
                Ok(Response::accepted(message_id))
            }
            Request::Ack {
                sender,
                message_id,
                timestamp,
                ..
            } => {
                self.handle_ack(sender, message_id, timestamp)?;
                Ok(Response::accepted(message_id))
            }
            Request::Status => Ok(Response::status(self.status())),
            Request::Report { .. } => Ok(Response::error(
                StatusCode::Rejected,
                "replicas do not accept status reports",
            )),
        }
    }
}

/// Maps a scheduler error to the status a peer or client sees.
pub fn status_for(err: &SchedulerError) -> StatusCode {
    match err {
        SchedulerError::Config(_) => StatusCode::Misconfigured,
        SchedulerError::Protocol(_) => StatusCode::Rejected,
        SchedulerError::ShuttingDown => StatusCode::Unavailable,
    }
}

impl<P: OrderingPolicy> Handler for Replica<P> {
    fn handle(&self, request: Request) -> Response {
        let kind = request.kind();
        let response = match self.respond(request) {
            Ok(response) => response,
            Err(err) => {
                let status = status_for(&err);
                match status {
                    StatusCode::Unavailable => {
                        tracing::debug!(replica = %self.id(), request = kind, "refused: {err}")
                    }
                    StatusCode::Misconfigured => {
                        tracing::error!(replica = %self.id(), request = kind, "{err}")
                    }
                    _ => tracing::warn!(replica = %self.id(), request = kind, "{err}"),
                }
                Response::error(status, err.to_string())
            }
        };
        response.answered_by(self.id())
    }
}

/// Runs admitted effects: fan-out rounds through the transport, store
/// application locally.
pub struct ReplicaExecutor<T> {
    membership: Membership,
    transport: T,
    store: Arc<KvStore>,
    fanout_parallelism: usize,
}

impl<C: LogicalClock, T: Transport> Executor<C> for ReplicaExecutor<T> {
    fn execute(&self, effect: Effect<C>) {
        match effect {
            Effect::Broadcast(env) => {
                let request = Request::Broadcast {
                    sender: self.membership.local(),
                    receiver: self.membership.local(),
                    message_id: env.message_id,
                    timestamp: env.timestamp.to_wire(),
                    key: env.payload.key,
                    value: env.payload.value,
                };
                fan_out(
                    &self.transport,
                    self.membership.replicas(),
                    &request,
                    self.fanout_parallelism,
                );
            }
            Effect::Acknowledge(env) => {
                let request = Request::Ack {
                    sender: self.membership.local(),
                    receiver: self.membership.local(),
                    message_id: env.message_id,
                    timestamp: env.timestamp.to_wire(),
                };
                fan_out(
                    &self.transport,
                    self.membership.replicas(),
                    &request,
                    self.fanout_parallelism,
                );
            }
            Effect::Apply(env) => self.store.apply(AppliedWrite::from_envelope(&env)),
        }
    }
}

#[derive(Debug, Default)]
pub struct FanOutReport {
    pub delivered: usize,
    pub failed: Vec<(ReplicaId, TransportError)>,
}

/// Sends `request`, addressed to each target in turn, to every target
/// using at most `parallelism` worker threads, and returns once every target was tried. A failed target is
/// logged and skipped; the round continues.
pub fn fan_out<T, I>(transport: &T, targets: I, request: &Request, parallelism: usize) -> FanOutReport
where
    T: Transport + ?Sized,
    I: IntoIterator<Item = ReplicaId>,
{
    let (tx, rx) = channel::unbounded();
    let mut count = 0usize;
    for target in targets {
        // Receiver is alive until the end of this function.
        let _ = tx.send(target);
        count += 1;
    }
    drop(tx);
    if count == 0 {
        return FanOutReport::default();
    }

    let report = Mutex::new(FanOutReport::default());
    let workers = parallelism.clamp(1, count);
    thread::scope(|scope| {
        for _ in 0..workers {
            let rx = rx.clone();
            let report = &report;
            scope.spawn(move || {
                for peer in rx.iter() {
                    let outcome = transport
                        .call(peer, &request.addressed_to(peer))
                        .and_then(Response::into_result);
                    let mut report = report.lock().expect("fan-out report lock poisoned");
                    match outcome {
                        Ok(_) => report.delivered += 1,
                        Err(err) => {
                            tracing::warn!(%peer, request = request.kind(), "fan-out failed: {err}");
                            report.failed.push((peer, err));
                        }
                    }
                }
            });
        }
    });
    report.into_inner().expect("fan-out report lock poisoned")
}

/// Receives lifecycle reports.
pub trait Coordinator: Send + Sync {
    fn report(
        &self,
        replica: ReplicaId,
        state: ReplicaState,
    ) -> Result<(), TransportError>;
}

fn report(coordinator: &dyn Coordinator, replica: ReplicaId, state: ReplicaState) {
    if let Err(err) = coordinator.report(replica, state) {
        tracing::warn!(%replica, %state, "coordinator report failed: {err}");
    }
}

/// Coordinator reached over TCP.
#[derive(Clone, Debug)]
pub struct TcpCoordinator {
    addr: String,
    listen_addr: Option<String>,
    max_frame_bytes: usize,
}

impl TcpCoordinator {
    pub fn new(addr: impl Into<String>, listen_addr: Option<String>, max_frame_bytes: usize) -> Self {
        Self {
            addr: addr.into(),
            listen_addr,
            max_frame_bytes,
        }
    }
}

impl Coordinator for TcpCoordinator {
    fn report(&self, replica: ReplicaId, state: ReplicaState) -> Result<(), TransportError> {
        let request = Request::Report {
            replica,
            state,
            listen_addr: self.listen_addr.clone(),
        };
        crate::transport::call_addr(&self.addr, &request, self.max_frame_bytes)?.into_result()?;
        Ok(())
    }
}

/// Coordinator side: records the last state each replica reported.
#[derive(Debug, Default)]
pub struct StatusBoard {
    states: Mutex<BTreeMap<ReplicaId, ReplicaState>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> BTreeMap<ReplicaId, ReplicaState> {
        self.states.lock().expect("status board lock poisoned").clone()
    }

    pub fn record(&self, replica: ReplicaId, state: ReplicaState) {
        self.states
            .lock()
            .expect("status board lock poisoned")
            .insert(replica, state);
    }
}

impl Coordinator for StatusBoard {
    fn report(&self, replica: ReplicaId, state: ReplicaState) -> Result<(), TransportError> {
        self.record(replica, state);
        Ok(())
    }
}

impl Handler for StatusBoard {
    fn handle(&self, request: Request) -> Response {
        match request {
            Request::Report {
                replica,
                state,
                listen_addr,
            } => {
                tracing::info!(%replica, %state, addr = listen_addr.as_deref().unwrap_or("-"), "replica reported");
                self.record(replica, state);
                Response::ok()
            }
            other => Response::error(
                StatusCode::Rejected,
                format!("coordinator does not handle {} requests", other.kind()),
            ),
        }
    }
}

/// Running replica: its loop thread and, when served over TCP, its server.
pub struct ReplicaHandle<P: OrderingPolicy> {
    replica: Arc<Replica<P>>,
    join: Option<JoinHandle<()>>,
    server: Option<ServerHandle>,
    coordinator: Option<Arc<dyn Coordinator>>,
}

impl<P: OrderingPolicy> ReplicaHandle<P> {
    pub fn replica(&self) -> &Arc<Replica<P>> {
        &self.replica
    }

    pub fn with_server(mut self, server: ServerHandle) -> Self {
        self.server = Some(server);
        self
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.server.as_ref().map(ServerHandle::local_addr)
    }

    /// Stops the loop, joins it, stops serving and reports `Down`.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let id = self.replica.id();
        self.replica.scheduler().shutdown();
        if let Some(join) = self.join.take()
            && join.join().is_err()
        {
            tracing::error!(replica = %id, "scheduler thread panicked");
        }
        if let Some(server) = self.server.take() {
            server.shutdown();
        }
        if let Some(coordinator) = self.coordinator.take() {
            report(coordinator.as_ref(), id, ReplicaState::Down);
        }
        tracing::info!(replica = %id, "replica stopped");
    }
}

impl<P: OrderingPolicy> Drop for ReplicaHandle<P> {
    fn drop(&mut self) {
        if self.join.is_some() {
            self.stop();
        }
    }
}
