//! TCP transport: one connection per call on the client side, a
//! non-blocking accept loop with one thread per connection on the server.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::core::ReplicaId;

use super::frame::{FrameError, FrameReader, FrameWriter};
use super::message::{Request, Response, StatusCode};
use super::{Handler, Transport, TransportError};

const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// Reaches replica `i` at `peers[i]`.
#[derive(Clone, Debug)]
pub struct TcpTransport {
    peers: Vec<String>,
    max_frame_bytes: usize,
    timeout: Option<Duration>,
}

impl TcpTransport {
    pub fn new(peers: Vec<String>, max_frame_bytes: usize) -> Self {
        Self {
            peers,
            max_frame_bytes,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn peer_addr(&self, peer: ReplicaId) -> Option<&str> {
        self.peers.get(peer.index()).map(String::as_str)
    }
}

impl Transport for TcpTransport {
    fn call(&self, peer: ReplicaId, request: &Request) -> Result<Response, TransportError> {
        let addr = self
            .peer_addr(peer)
            .ok_or(TransportError::UnknownPeer { peer })?;
        call_with(addr, request, self.max_frame_bytes, self.timeout)
    }
}

/// Sends one request to `addr` over a fresh connection.
pub fn call_addr(
    addr: &str,
    request: &Request,
    max_frame_bytes: usize,
) -> Result<Response, TransportError> {
    call_with(addr, request, max_frame_bytes, None)
}

fn call_with(
    addr: &str,
    request: &Request,
    max_frame_bytes: usize,
    timeout: Option<Duration>,
) -> Result<Response, TransportError> {
    let stream = TcpStream::connect(addr)?;
    stream.set_nodelay(true)?;
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    let mut writer = FrameWriter::new(stream.try_clone()?, max_frame_bytes);
    writer.write_frame(&serde_json::to_vec(request)?)?;

    let mut reader = FrameReader::new(stream, max_frame_bytes);
    let Some(body) = reader.read_next()? else {
        return Err(TransportError::Closed);
    };
    Ok(serde_json::from_slice(&body)?)
}

pub struct ServerHandle {
    shutdown: Arc<AtomicBool>,
    join: JoinHandle<()>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting and joins the accept loop. Connections already
    /// being served finish on their own threads.
    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        let _ = self.join.join();
    }
}

/// Serves `handler` on an already bound listener.
pub fn serve<H: Handler>(
    listener: TcpListener,
    handler: Arc<H>,
    max_frame_bytes: usize,
) -> io::Result<ServerHandle> {
    listener.set_nonblocking(true)?;
    let local_addr = listener.local_addr()?;
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);

    let join = thread::Builder::new()
        .name(format!("accept-{}", local_addr.port()))
        .spawn(move || run_accept_loop(listener, handler, max_frame_bytes, flag))?;

    Ok(ServerHandle {
        shutdown,
        join,
        local_addr,
    })
}

fn run_accept_loop<H: Handler>(
    listener: TcpListener,
    handler: Arc<H>,
    max_frame_bytes: usize,
    shutdown: Arc<AtomicBool>,
) {
    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, peer)) => {
                let handler = Arc::clone(&handler);
                thread::spawn(move || {
                    if let Err(err) = serve_connection(stream, handler.as_ref(), max_frame_bytes) {
                        tracing::warn!(%peer, "connection error: {err}");
                    }
                });
            }
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                tracing::warn!("accept error: {err}");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

#[derive(Debug, Error)]
enum ConnectionError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

fn serve_connection<H: Handler>(
    stream: TcpStream,
    handler: &H,
    max_frame_bytes: usize,
) -> Result<(), ConnectionError> {
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    let mut reader = FrameReader::new(stream.try_clone()?, max_frame_bytes);
    let mut writer = FrameWriter::new(stream, max_frame_bytes);

    while let Some(body) = reader.read_next()? {
        let response = match serde_json::from_slice::<Request>(&body) {
            Ok(request) => handler.handle(request),
            Err(err) => {
                tracing::warn!("undecodable request: {err}");
                Response::error(StatusCode::Rejected, format!("undecodable request: {err}"))
            }
        };
        writer.write_frame(&serde_json::to_vec(&response)?)?;
    }
    Ok(())
}
