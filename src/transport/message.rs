//! Wire messages. Every request is answered by exactly one [`Response`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::{MessageId, Mode, ReplicaId, Timestamp, WritePayload};
use crate::sched::SchedulerStats;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Client write submitted to one replica.
    Write { key: String, value: String },
    /// Stamped write fanned out by its origin to every replica.
    Broadcast {
        sender: ReplicaId,
        receiver: ReplicaId,
        message_id: MessageId,
        timestamp: Timestamp,
        key: String,
        value: String,
    },
    /// Total-order acknowledgment of a received write.
    Ack {
        sender: ReplicaId,
        receiver: ReplicaId,
        message_id: MessageId,
        timestamp: Timestamp,
    },
    Status,
    /// Lifecycle report sent by a replica to the coordinator.
    Report {
        replica: ReplicaId,
        state: ReplicaState,
        listen_addr: Option<String>,
    },
}

impl Request {
    pub fn write(payload: WritePayload) -> Self {
        Request::Write {
            key: payload.key,
            value: payload.value,
        }
    }

    /// Replica a peer-to-peer request is addressed to. Client and
    /// coordinator requests have none.
    pub fn receiver(&self) -> Option<ReplicaId> {
        match self {
            Request::Broadcast { receiver, .. } | Request::Ack { receiver, .. } => Some(*receiver),
            _ => None,
        }
    }

    /// Copy of this request addressed to `peer`.
    pub fn addressed_to(&self, peer: ReplicaId) -> Request {
        let mut request = self.clone();
        if let Request::Broadcast { receiver, .. } | Request::Ack { receiver, .. } = &mut request {
            *receiver = peer;
        }
        request
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Request::Write { .. } => "write",
            Request::Broadcast { .. } => "broadcast",
            Request::Ack { .. } => "ack",
            Request::Status => "status",
            Request::Report { .. } => "report",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaState {
    Ready,
    Down,
}

impl fmt::Display for ReplicaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReplicaState::Ready => "ready",
            ReplicaState::Down => "down",
        })
    }
}

/// Response status. Serialized as its numeric code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StatusCode {
    Ok = 0,
    /// The request violated the ordering protocol.
    Rejected = 1,
    /// Cluster misconfiguration: wrong mode, dimension, replica id, or a
    /// full buffer.
    Misconfigured = 2,
    /// The replica is shutting down.
    Unavailable = 3,
}

impl StatusCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

impl From<StatusCode> for u8 {
    fn from(status: StatusCode) -> Self {
        status.code()
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(StatusCode::Ok),
            1 => Ok(StatusCode::Rejected),
            2 => Ok(StatusCode::Misconfigured),
            3 => Ok(StatusCode::Unavailable),
            other => Err(format!("unknown status code {other}")),
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatusCode::Ok => "ok",
            StatusCode::Rejected => "rejected",
            StatusCode::Misconfigured => "misconfigured",
            StatusCode::Unavailable => "unavailable",
        };
        write!(f, "{name}({})", self.code())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaStatus {
    pub replica: ReplicaId,
    pub mode: Mode,
    pub clock: Timestamp,
    pub pending: usize,
    pub applied: usize,
    pub admitted: u64,
    pub parked: u64,
    pub wakeups: u64,
}

impl ReplicaStatus {
    pub fn with_stats(mut self, stats: SchedulerStats) -> Self {
        self.admitted = stats.admitted;
        self.parked = stats.parked;
        self.wakeups = stats.wakeups;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub status: StatusCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replica: Option<ReplicaStatus>,
    /// Replica that produced this response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<ReplicaId>,
}

impl Response {
    pub fn ok() -> Self {
        Self {
            status: StatusCode::Ok,
            message_id: None,
            reason: None,
            replica: None,
            receiver: None,
        }
    }

    pub fn answered_by(mut self, receiver: ReplicaId) -> Self {
        self.receiver = Some(receiver);
        self
    }

    pub fn accepted(message_id: MessageId) -> Self {
        Self {
            message_id: Some(message_id),
            ..Self::ok()
        }
    }

    pub fn status(status: ReplicaStatus) -> Self {
        Self {
            replica: Some(status),
            ..Self::ok()
        }
    }

    pub fn error(status: StatusCode, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
            ..Self::ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ScalarTimestamp;

    #[test]
    fn status_code_travels_as_number() {
        let json = serde_json::to_value(Response::error(StatusCode::Unavailable, "stopping"))
            .unwrap();
        assert_eq!(json["status"], 3);
        assert_eq!(json["reason"], "stopping");
        assert!(json.get("message_id").is_none());

        let err = serde_json::from_str::<Response>(r#"{"status":9}"#).unwrap_err();
        assert!(err.to_string().contains("unknown status code 9"));
    }

    #[test]
    fn ack_request_json_shape() {
        let request = Request::Ack {
            sender: ReplicaId::new(2),
            receiver: ReplicaId::new(1),
            message_id: MessageId::new(ReplicaId::new(0), 7),
            timestamp: Timestamp::Scalar(ScalarTimestamp::new(11)),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "ack");
        assert_eq!(json["sender"], 2);
        assert_eq!(json["receiver"], 1);
        assert_eq!(json["message_id"]["seq"], 7);
        assert_eq!(json["timestamp"]["kind"], "scalar");
        assert_eq!(json["timestamp"]["value"], 11);
        let back: Request = serde_json::from_value(json).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn addressed_copies_carry_their_receiver() {
        let broadcast = Request::Broadcast {
            sender: ReplicaId::new(0),
            receiver: ReplicaId::new(0),
            message_id: MessageId::new(ReplicaId::new(0), 1),
            timestamp: Timestamp::Scalar(ScalarTimestamp::new(1)),
            key: "k".into(),
            value: "v".into(),
        };
        let copy = broadcast.addressed_to(ReplicaId::new(2));
        assert_eq!(copy.receiver(), Some(ReplicaId::new(2)));
        assert_eq!(broadcast.receiver(), Some(ReplicaId::new(0)));
        assert_eq!(Request::Status.addressed_to(ReplicaId::new(2)), Request::Status);
        assert_eq!(Request::Status.receiver(), None);

        let json = serde_json::to_value(Response::ok().answered_by(ReplicaId::new(2))).unwrap();
        assert_eq!(json["receiver"], 2);
        assert!(serde_json::to_value(Response::ok()).unwrap().get("receiver").is_none());
    }
}
