use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::endpoint::{Endpoint, PeerRole};
use crate::protocol::{self, Event, ProtocolError};

/// Frames decoded ahead of the session before the reader task waits
const INBOUND_BUFFER: usize = 64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Per-connection failures
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("failed to connect to {role} at {endpoint}: {source}")]
    Connect {
        role: PeerRole,
        endpoint: Endpoint,
        #[source]
        source: std::io::Error,
    },

    #[error("write failed: {0}")]
    WriteFailed(String),

    #[error("stream closed")]
    StreamClosed,

    #[error(transparent)]
    Malformed(ProtocolError),
}

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One bidirectional event stream to a Wyoming peer
///
/// Inbound frames are decoded by a dedicated reader task, so `receive` is
/// cancel-safe and can sit inside `tokio::select!`.
pub struct PeerConnection {
    id: u64,
    role: PeerRole,
    label: String,
    writer: Option<BoxedWriter>,
    inbound: mpsc::Receiver<Result<Event, ProtocolError>>,
    alive: Arc<watch::Sender<bool>>,
    reader_task: JoinHandle<()>,
}

impl PeerConnection {
    /// Open a TCP connection to `endpoint`
    pub async fn connect(endpoint: &Endpoint, role: PeerRole) -> Result<Self, PeerError> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|source| PeerError::Connect {
                role,
                endpoint: endpoint.clone(),
                source,
            })?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", endpoint, e);
        }

        Ok(Self::from_stream(stream, role, endpoint.to_string()))
    }

    /// Wrap an already established stream
    pub fn from_stream<S>(stream: S, role: PeerRole, label: impl Into<String>) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let label = label.into();
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, inbound) = mpsc::channel(INBOUND_BUFFER);
        let (alive, _) = watch::channel(true);
        let alive = Arc::new(alive);

        let reader_alive = Arc::clone(&alive);
        let reader_label = label.clone();
        let reader_task = tokio::spawn(async move {
            let mut reader = BufReader::new(read_half);
            loop {
                match protocol::read_frame(&mut reader).await {
                    Ok(Some(event)) => {
                        if tx.send(Ok(event)).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("{} {} closed the stream (conn {})", role, reader_label, id);
                        break;
                    }
                    Err(e) => {
                        warn!("{} {} read failed (conn {}): {}", role, reader_label, id, e);
                        let _ = tx.send(Err(e)).await;
                        break;
                    }
                }
            }
            reader_alive.send_replace(false);
        });

        info!("Connected to {} {} (conn {})", role, label, id);

        Self {
            id,
            role,
            label,
            writer: Some(Box::new(write_half)),
            inbound,
            alive,
            reader_task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_alive(&self) -> bool {
        *self.alive.borrow() && self.writer.is_some()
    }

    /// Subscribe to the liveness flag; it flips to `false` exactly once
    pub fn liveness(&self) -> watch::Receiver<bool> {
        self.alive.subscribe()
    }

    /// Resolves once the connection has been lost or closed
    pub async fn closed(&self) {
        let mut rx = self.alive.subscribe();
        let _ = rx.wait_for(|alive| !*alive).await;
    }

    /// Write one encoded frame
    pub async fn send(&mut self, event: &Event) -> Result<(), PeerError> {
        if !*self.alive.borrow() {
            return Err(PeerError::WriteFailed(format!("{} {} is closed", self.role, self.label)));
        }
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| PeerError::WriteFailed("connection closed locally".into()))?;

        let frame = protocol::encode(event).map_err(|e| PeerError::WriteFailed(e.to_string()))?;

        let result = async {
            writer.write_all(&frame).await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = result {
            warn!("Write of {} to {} {} failed: {}", event.event_type(), self.role, self.label, e);
            self.alive.send_replace(false);
            return Err(PeerError::WriteFailed(e.to_string()));
        }

        debug!("-> {} {}: {}", self.role, self.label, event.event_type());
        Ok(())
    }

    /// Wait for the next decoded event
    pub async fn receive(&mut self) -> Result<Event, PeerError> {
        match self.inbound.recv().await {
            Some(Ok(event)) => {
                debug!("<- {} {}: {}", self.role, self.label, event.event_type());
                Ok(event)
            }
            Some(Err(ProtocolError::Io(_))) | None => {
                self.alive.send_replace(false);
                Err(PeerError::StreamClosed)
            }
            Some(Err(e)) => {
                self.alive.send_replace(false);
                Err(PeerError::Malformed(e))
            }
        }
    }

    /// Discard events left over from a previous exchange
    ///
    /// Returns `false` when the connection turned out to be unusable.
    pub fn drain_stale(&mut self) -> bool {
        loop {
            match self.inbound.try_recv() {
                Ok(Ok(event)) => {
                    debug!("Dropping stale {} from {} {}", event.event_type(), self.role, self.label)
                }
                Ok(Err(_)) => return false,
                Err(mpsc::error::TryRecvError::Empty) => return self.is_alive(),
                Err(mpsc::error::TryRecvError::Disconnected) => return false,
            }
        }
    }

    /// Release the stream; safe to call more than once
    pub async fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown of {} {} failed: {}", self.role, self.label, e);
            }
            info!("Closed {} {} (conn {})", self.role, self.label, self.id);
        }
        self.reader_task.abort();
        self.alive.send_replace(false);
    }
}

impl Drop for PeerConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.alive.send_replace(false);
    }
}

impl std::fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerConnection")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("label", &self.label)
            .field("alive", &self.is_alive())
            .finish()
    }
}
