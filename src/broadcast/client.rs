//! Downstream client handles
//!
//! A client is a one-way byte sink backed by an unbounded channel. The
//! transport task on the other end drains the channel into the actual
//! WebSocket or SSE connection; when that task is gone, sends fail and
//! the owning registry drops the handle.

use bytes::Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Unique identifier for a connected client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct ClientId(Uuid);

impl ClientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Sending half of a client connection
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    tx: mpsc::UnboundedSender<Bytes>,
}

impl ClientHandle {
    /// Create a handle plus the receiving end its transport task drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: ClientId::new(),
                tx,
            },
            rx,
        )
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Queue bytes for delivery. Returns false when the client is gone.
    pub fn send(&self, data: Bytes) -> bool {
        self.tx.send(data).is_ok()
    }

    /// True once the transport task has dropped its receiver
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
