//! # Transport Layer
//!
//! Byte-stream collaborators for the protocol engine.
//!
//! A transport accepts outbound bytes through [`Transport::write`] and reports
//! what happens on the stream as [`TransportEvent`]s on a channel. Chunks arrive
//! in order but with arbitrary boundaries; reassembly is the engine's job.
//!
//! ## Components
//! - **Memory**: in-process channel pair, used to wire two engines together
//! - **Stream**: drives any tokio `AsyncRead + AsyncWrite`, with TCP helpers
//!
//! Reconnection policy is left to the owner of the transport.

pub mod memory;
pub mod stream;

use crate::error::Result;
use bytes::Bytes;

/// Outbound half of a byte stream
pub trait Transport: Send + Sync + 'static {
    /// Queue `bytes` for writing; never blocks
    fn write(&self, bytes: Bytes) -> Result<()>;

    /// Stop accepting writes and tear the stream down
    fn close(&self) {}
}

/// Inbound notifications from a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Data(Bytes),
    Disconnected,
}
