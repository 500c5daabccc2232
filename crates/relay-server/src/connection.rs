//! Per-socket client connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use relay_core::ServerEvent;
use relay_core::ids::ConnectionId;

/// Represents one connected WebSocket client.
///
/// Shared between the session pump, the state registry, and background
/// delivery tasks. Frames are handed to the socket's write task over a
/// bounded channel; a full or closed channel counts the frame as dropped
/// rather than blocking a handler.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Send channel to the connection's WebSocket write task.
    tx: mpsc::Sender<Arc<String>>,
    /// When this connection was established.
    pub connected_at: Instant,
    /// Whether the transport is still open.
    is_open: AtomicBool,
    /// When the last application heartbeat arrived.
    last_heartbeat: Mutex<Instant>,
    /// Count of frames dropped due to a full or closed channel.
    pub dropped_frames: AtomicU64,
    /// Cancelled to force-close the session pump.
    close: CancellationToken,
}

impl ClientConnection {
    /// Create a new connection around the write channel.
    pub fn new(id: ConnectionId, tx: mpsc::Sender<Arc<String>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            tx,
            connected_at: now,
            is_open: AtomicBool::new(true),
            last_heartbeat: Mutex::new(now),
            dropped_frames: AtomicU64::new(0),
            close: CancellationToken::new(),
        }
    }

    /// Enqueue a pre-serialized frame.
    ///
    /// Returns `false` if the transport is closed or the channel is full,
    /// and increments the dropped counter.
    pub fn send_raw(&self, frame: Arc<String>) -> bool {
        if !self.is_open() {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        if self.tx.try_send(frame).is_ok() {
            true
        } else {
            let _ = self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    /// Serialize and enqueue a server event.
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(json) => self.send_raw(Arc::new(json)),
            Err(_) => false,
        }
    }

    /// Total frames dropped for this connection.
    pub fn drop_count(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }

    /// Record an application heartbeat.
    pub fn mark_heartbeat(&self) {
        *self.last_heartbeat.lock() = Instant::now();
    }

    /// Time since the last heartbeat (or connection establishment).
    pub fn heartbeat_elapsed(&self) -> Duration {
        self.last_heartbeat.lock().elapsed()
    }

    /// Whether the transport is still open.
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Relaxed)
    }

    /// Mark the transport closed. Called by the session pump on teardown.
    pub fn mark_closed(&self) {
        self.is_open.store(false, Ordering::Relaxed);
    }

    /// Close the connection from outside the session pump.
    ///
    /// Marks the transport closed and cancels the close token, which the
    /// pump selects on.
    pub fn force_close(&self) {
        self.mark_closed();
        self.close.cancel();
    }

    /// Token cancelled by [`force_close`](Self::force_close).
    pub fn close_token(&self) -> CancellationToken {
        self.close.clone()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("is_open", &self.is_open())
            .field("dropped_frames", &self.drop_count())
            .finish_non_exhaustive()
    }
}
