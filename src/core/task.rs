//! Units of work consumed by the scheduler loop.

use serde::{Deserialize, Serialize};

use super::identity::{MessageId, ReplicaId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WritePayload {
    pub key: String,
    pub value: String,
}

impl WritePayload {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A stamped write as it travels between replicas.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope<C> {
    pub message_id: MessageId,
    pub timestamp: C,
    pub payload: WritePayload,
}

impl<C> Envelope<C> {
    pub fn origin(&self) -> ReplicaId {
        self.message_id.origin
    }
}

/// A locally issued write. Its timestamp does not exist yet: it is assigned
/// once, when the scheduler admits the task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outgoing {
    pub message_id: MessageId,
    pub payload: WritePayload,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskKind {
    Broadcast,
    Write,
    Ack,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Broadcast => "broadcast",
            TaskKind::Write => "write",
            TaskKind::Ack => "ack",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Task<C> {
    /// Write originated here, waiting to be stamped and fanned out.
    Broadcast(Outgoing),
    /// Write received from a peer (or from ourselves) awaiting admission.
    Write(Envelope<C>),
    /// Acknowledgment round owed for a received write.
    Ack(Envelope<C>),
}

impl<C> Task<C> {
    pub fn kind(&self) -> TaskKind {
        match self {
            Task::Broadcast(_) => TaskKind::Broadcast,
            Task::Write(_) => TaskKind::Write,
            Task::Ack(_) => TaskKind::Ack,
        }
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            Task::Broadcast(out) => out.message_id,
            Task::Write(env) | Task::Ack(env) => env.message_id,
        }
    }

    pub fn origin(&self) -> ReplicaId {
        self.message_id().origin
    }

    pub fn timestamp(&self) -> Option<&C> {
        match self {
            Task::Broadcast(_) => None,
            Task::Write(env) | Task::Ack(env) => Some(&env.timestamp),
        }
    }

    pub fn payload(&self) -> &WritePayload {
        match self {
            Task::Broadcast(out) => &out.payload,
            Task::Write(env) | Task::Ack(env) => &env.payload,
        }
    }
}
