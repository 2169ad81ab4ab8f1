//! In-process transport.
//!
//! [`pair`] returns two linked endpoints: bytes written on one arrive as
//! [`TransportEvent::Data`] on the other. Both sides start with a queued
//! [`TransportEvent::Connected`].

use super::{Transport, TransportEvent};
use crate::error::{constants, ProtocolError, Result};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Writes into the peer's event channel
#[derive(Debug)]
pub struct MemoryTransport {
    peer: mpsc::UnboundedSender<TransportEvent>,
    closed: AtomicBool,
}

impl MemoryTransport {
    fn new(peer: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            peer,
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Transport for MemoryTransport {
    fn write(&self, bytes: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(ProtocolError::TransportError(
                constants::ERR_TRANSPORT_CLOSED.to_string(),
            ));
        }
        self.peer
            .send(TransportEvent::Data(bytes))
            .map_err(|_| ProtocolError::TransportError(constants::ERR_TRANSPORT_CLOSED.to_string()))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("Closing in-memory transport");
            let _ = self.peer.send(TransportEvent::Disconnected);
        }
    }
}

/// One side of an in-memory link
pub struct MemoryLink {
    pub transport: Arc<MemoryTransport>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Two connected endpoints
pub fn pair() -> (MemoryLink, MemoryLink) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    let _ = a_tx.send(TransportEvent::Connected);
    let _ = b_tx.send(TransportEvent::Connected);

    let a = MemoryLink {
        transport: Arc::new(MemoryTransport::new(b_tx)),
        events: a_rx,
    };
    let b = MemoryLink {
        transport: Arc::new(MemoryTransport::new(a_tx)),
        events: b_rx,
    };
    (a, b)
}

/// A transport whose writes are captured on the returned channel
pub fn capture() -> (Arc<MemoryTransport>, mpsc::UnboundedReceiver<TransportEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(MemoryTransport::new(tx)), rx)
}
