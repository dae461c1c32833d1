//! Request/response plumbing between replicas.
//!
//! Calls are synchronous: [`Transport::call`] returns only after the target
//! handled the request, so a fan-out round that returns has buffered its
//! message everywhere it succeeded.

mod frame;
mod local;
mod message;
mod tcp;

use thiserror::Error;

use crate::core::ReplicaId;
use crate::error::{Effect, Transience};

pub use frame::{FRAME_HEADER_LEN, FrameError, FrameReader, FrameWriter, encode_frame};
pub use local::{LocalMesh, LocalTransport};
pub use message::{ReplicaState, ReplicaStatus, Request, Response, StatusCode};
pub use tcp::{ServerHandle, TcpTransport, call_addr, serve};

/// Outbound side: deliver one request to a replica and wait for its answer.
pub trait Transport: Send + Sync {
    fn call(&self, peer: ReplicaId, request: &Request) -> Result<Response, TransportError>;
}

/// Inbound side: answer one request. Errors become response status codes.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, request: Request) -> Response;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn call(&self, peer: ReplicaId, request: &Request) -> Result<Response, TransportError> {
        (**self).call(peer, request)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("no address for replica {peer}")]
    UnknownPeer { peer: ReplicaId },
    #[error("peer answered {status}: {reason}")]
    Rejected { status: StatusCode, reason: String },
    #[error("connection closed before a response arrived")]
    Closed,
}

impl TransportError {
    pub fn transience(&self) -> Transience {
        match self {
            TransportError::Io(_) | TransportError::Frame(_) | TransportError::Closed => {
                Transience::Retryable
            }
            TransportError::Rejected { status, .. } if *status == StatusCode::Unavailable => {
                Transience::Retryable
            }
            TransportError::Codec(_)
            | TransportError::UnknownPeer { .. }
            | TransportError::Rejected { .. } => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            TransportError::Io(_) | TransportError::Frame(_) | TransportError::Closed => {
                Effect::Unknown
            }
            TransportError::Codec(_)
            | TransportError::UnknownPeer { .. }
            | TransportError::Rejected { .. } => Effect::None,
        }
    }
}

impl Response {
    /// Turns a non-`Ok` status into [`TransportError::Rejected`].
    pub fn into_result(self) -> Result<Response, TransportError> {
        if self.status.is_ok() {
            Ok(self)
        } else {
            Err(TransportError::Rejected {
                status: self.status,
                reason: self.reason.unwrap_or_default(),
            })
        }
    }
}
