//! In-process transport. Calls run the target's handler on the caller's
//! thread. Individual links can be held to reorder delivery in tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use crate::core::ReplicaId;

use super::message::{Request, Response};
use super::{Handler, Transport, TransportError};

type Link = (ReplicaId, ReplicaId);

#[derive(Default)]
struct MeshInner {
    handlers: RwLock<HashMap<ReplicaId, Arc<dyn Handler>>>,
    /// Held links and the requests queued on them, oldest first.
    held: Mutex<HashMap<Link, VecDeque<Request>>>,
}

/// Shared switchboard for an in-process cluster.
#[derive(Clone, Default)]
pub struct LocalMesh {
    inner: Arc<MeshInner>,
}

impl LocalMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, replica: ReplicaId, handler: Arc<dyn Handler>) {
        self.inner
            .handlers
            .write()
            .expect("mesh lock poisoned")
            .insert(replica, handler);
    }

    pub fn unregister(&self, replica: ReplicaId) {
        self.inner
            .handlers
            .write()
            .expect("mesh lock poisoned")
            .remove(&replica);
    }

    /// Transport used by `replica` for its outbound calls.
    pub fn endpoint(&self, replica: ReplicaId) -> LocalTransport {
        LocalTransport {
            mesh: self.clone(),
            from: replica,
        }
    }

    /// Queues every later request on `from -> to` instead of delivering it.
    /// Queued calls are answered `Ok` immediately.
    pub fn hold(&self, from: ReplicaId, to: ReplicaId) {
        self.inner
            .held
            .lock()
            .expect("mesh lock poisoned")
            .entry((from, to))
            .or_default();
    }

    pub fn held_len(&self, from: ReplicaId, to: ReplicaId) -> usize {
        self.inner
            .held
            .lock()
            .expect("mesh lock poisoned")
            .get(&(from, to))
            .map_or(0, VecDeque::len)
    }

    /// Reopens the link and delivers what was queued on it, in order.
    /// Returns the responses.
    pub fn release(&self, from: ReplicaId, to: ReplicaId) -> Vec<Result<Response, TransportError>> {
        let queued = self
            .inner
            .held
            .lock()
            .expect("mesh lock poisoned")
            .remove(&(from, to))
            .unwrap_or_default();
        queued
            .into_iter()
            .map(|request| self.deliver(to, request))
            .collect()
    }

    fn handler(&self, replica: ReplicaId) -> Option<Arc<dyn Handler>> {
        self.inner
            .handlers
            .read()
            .expect("mesh lock poisoned")
            .get(&replica)
            .cloned()
    }

    fn deliver(&self, to: ReplicaId, request: Request) -> Result<Response, TransportError> {
        let handler = self
            .handler(to)
            .ok_or(TransportError::UnknownPeer { peer: to })?;
        Ok(handler.handle(request))
    }

    fn send(&self, from: ReplicaId, to: ReplicaId, request: &Request) -> Result<Response, TransportError> {
        {
            let mut held = self.inner.held.lock().expect("mesh lock poisoned");
            if let Some(queue) = held.get_mut(&(from, to)) {
                queue.push_back(request.clone());
                return Ok(Response::ok());
            }
        }
        self.deliver(to, request.clone())
    }
}

#[derive(Clone)]
pub struct LocalTransport {
    mesh: LocalMesh,
    from: ReplicaId,
}

impl LocalTransport {
    pub fn replica(&self) -> ReplicaId {
        self.from
    }
}

impl Transport for LocalTransport {
    fn call(&self, peer: ReplicaId, request: &Request) -> Result<Response, TransportError> {
        self.mesh.send(self.from, peer, request)
    }
}
