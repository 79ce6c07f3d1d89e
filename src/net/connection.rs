//! Per-connection handling and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track active connections for graceful shutdown
//! - Read one request, dispatch it, write the response, close
//!
//! # Design Decisions
//! - One request per connection; the socket is always shut down afterwards
//! - Reads stop at the end of the head plus any declared body, at peer close,
//!   or at the configured size limit, whichever comes first
//! - Every read and the final write carry a deadline; a client that stalls
//!   after sending part of a request still gets a response

use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ProxyConfig;
use crate::http::parser::{head_end, parse_request, peek_status};
use crate::observability::logging::request_span;
use crate::observability::metrics;
use crate::routing::Dispatcher;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

const READ_CHUNK: usize = 4096;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    /// Current count of active connections.
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    /// Create a new connection tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        let count = self.active_count.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_active_connections(count);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    /// Get current active connection count.
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed or `limit` elapses.
    ///
    /// Returns `true` if every connection finished in time.
    pub async fn wait_for_idle(&self, limit: Duration) -> bool {
        let drained = async {
            while self.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        timeout(limit, drained).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
/// Decrements active count when dropped.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = self.active_count.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::record_active_connections(count);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}

/// Limits applied while serving one connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_request_bytes: usize,
}

impl ConnectionSettings {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            read_timeout: config.timeouts.client_read(),
            write_timeout: config.timeouts.client_write(),
            max_request_bytes: config.limits.max_request_bytes,
        }
    }
}

/// Errors that end a connection without a response.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to read request: {0}")]
    Read(std::io::Error),

    #[error("client sent nothing within {0:?}")]
    ReadTimeout(Duration),

    #[error("failed to write response: {0}")]
    Write(std::io::Error),

    #[error("client did not accept the response within {0:?}")]
    WriteTimeout(Duration),
}

/// Serve a single request on `stream`, then close it.
pub async fn serve_connection<S>(
    mut stream: S,
    peer_addr: SocketAddr,
    dispatcher: Dispatcher,
    settings: ConnectionSettings,
    guard: ConnectionGuard,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let span = request_span(guard.id(), Uuid::new_v4());
    async move {
        match exchange(&mut stream, &dispatcher, &settings).await {
            Ok(Exchange::Served(status)) => {
                metrics::record_response(status);
            }
            Ok(Exchange::Empty) => {
                tracing::debug!(peer_addr = %peer_addr, "Client closed without sending a request");
            }
            Err(e) => {
                tracing::warn!(peer_addr = %peer_addr, error = %e, "Connection aborted");
            }
        }
        let _ = stream.shutdown().await;
        drop(guard);
    }
    .instrument(span)
    .await
}

/// Outcome of one request/response exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exchange {
    /// A response was written; carries its status code when readable.
    Served(Option<u16>),
    /// The peer closed before sending anything.
    Empty,
}

/// Read, dispatch, write.
async fn exchange<S>(
    stream: &mut S,
    dispatcher: &Dispatcher,
    settings: &ConnectionSettings,
) -> Result<Exchange, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let raw = read_request(stream, settings).await?;
    if raw.is_empty() {
        return Ok(Exchange::Empty);
    }

    let response = match parse_request(&raw) {
        Ok(request) => {
            let response = dispatcher.dispatch(&request).await;
            tracing::info!(
                method = %request.method,
                target = %request.target,
                status = ?peek_status(&response),
                bytes = response.len(),
                "Request served"
            );
            response
        }
        Err(e) => {
            tracing::info!(error = %e, "Rejecting unparsable request");
            Dispatcher::reject(&e)
        }
    };

    timeout(settings.write_timeout, stream.write_all(&response))
        .await
        .map_err(|_| ConnectionError::WriteTimeout(settings.write_timeout))?
        .map_err(ConnectionError::Write)?;

    Ok(Exchange::Served(peek_status(&response)))
}

/// Read one request's bytes.
///
/// An empty buffer means the peer closed before sending anything. Once some
/// bytes have arrived, a read deadline ends the request like end of input:
/// a body shorter than its `Content-Length` is dispatched as received.
async fn read_request<S>(stream: &mut S, settings: &ConnectionSettings) -> Result<BytesMut, ConnectionError>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    while buf.len() < settings.max_request_bytes {
        let room = (settings.max_request_bytes - buf.len()).min(READ_CHUNK);
        let n = match timeout(settings.read_timeout, stream.read(&mut chunk[..room])).await {
            Ok(read) => read.map_err(ConnectionError::Read)?,
            Err(_) if buf.is_empty() => {
                return Err(ConnectionError::ReadTimeout(settings.read_timeout));
            }
            Err(_) => {
                tracing::debug!(
                    received = buf.len(),
                    "Client stalled mid-request, handling what arrived"
                );
                break;
            }
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = head_end(&buf) {
            if buf.len() >= end + declared_body_len(&buf[..end]) {
                break;
            }
        }
    }

    Ok(buf)
}

/// `Content-Length` of a request head, or zero when absent or unparsable.
fn declared_body_len(head: &[u8]) -> usize {
    head.split(|&b| b == b'\n')
        .filter_map(|line| {
            let colon = line.iter().position(|&b| b == b':')?;
            let (name, value) = line.split_at(colon);
            if !name.eq_ignore_ascii_case(b"content-length") {
                return None;
            }
            std::str::from_utf8(&value[1..]).ok()?.trim().parse().ok()
        })
        .next()
        .unwrap_or(0)
}
