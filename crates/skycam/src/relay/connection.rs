//! Connection handles: the sending half of one WebSocket.
//!
//! The socket task owns the transport; everything else holds a
//! [`ConnectionHandle`] and reaches the socket through a bounded queue.
//! Delivery is fire-and-forget: a send to a closed transport is silently
//! discarded, and a send that would overflow the queue drops the payload
//! instead of blocking the sender. A slow viewer therefore loses frames
//! rather than stalling the broadcast.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

/// Process-unique identity of one connection.
///
/// Allocated monotonically, never reused. Two connections from the same
/// peer get distinct ids, which is what makes stale close events
/// distinguishable from current ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl ConnId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An outbound payload: a JSON control message or an opaque binary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Binary(Bytes),
}

/// What happened to a send attempt.
///
/// Sends never error; the status exists so callers can count drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    Sent,
    /// The outbound queue was full. The payload was dropped rather than
    /// blocking the sender.
    Dropped,
    /// The transport is closed. The payload was discarded.
    Closed,
}

/// Cheap-to-clone handle for queueing payloads to one socket.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnId,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionHandle {
    /// Create a handle plus the receiving half the socket task drains.
    /// `buffer` is clamped to at least 1.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: ConnId::next(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnId {
        self.id
    }

    /// Whether the underlying transport is still open.
    ///
    /// Derived from the queue: the socket task drops the receiver when the
    /// transport closes, so this reflects the transport's state at call
    /// time instead of caching it.
    pub fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }

    /// Queue a payload for delivery. Never blocks and never errors.
    pub fn send(&self, payload: Outbound) -> SendStatus {
        match self.tx.try_send(payload) {
            Ok(()) => SendStatus::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => SendStatus::Dropped,
            Err(mpsc::error::TrySendError::Closed(_)) => SendStatus::Closed,
        }
    }
}
