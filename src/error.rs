//! # Error Types
//!
//! Error handling for the bridge: framing, envelope dispatch, request/response
//! correlation, configuration and log storage.
//!
//! ## Error Categories
//! - **Framing Errors**: malformed byte-stuffing, oversized reassembly carry
//! - **Dispatch Errors**: unknown payload type tags, typed decode mismatches
//! - **Exchange Errors**: response timeouts, remote application errors, unmapped responses
//! - **Connection Errors**: transport disconnects
//! - **I/O and Serialization Errors**: file and socket failures, bincode failures
//!
//! Framing and dispatch errors never surface to callers of the protocol engine;
//! the offending frame is dropped and logged. Exchange and connection errors are
//! delivered to the caller awaiting a response.
//!
//! Cipher and key-derivation preconditions (key and nonce lengths) are programmer
//! errors and panic at the call site instead of producing a variant here.
//!
//! ## Example Usage
//! ```rust
//! use devbridge::core::cobs;
//! use devbridge::error::{ProtocolError, Result};
//! use tracing::warn;
//!
//! fn unstuff(frame: &[u8]) -> Result<Vec<u8>> {
//!     cobs::decode(frame)
//! }
//!
//! match unstuff(&[0x00, 0x01]) {
//!     Err(ProtocolError::MalformedFrame) => warn!("dropping malformed frame"),
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

use crate::core::envelope::Payload;
use crate::protocol::message::ErrorResponse;
use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Dispatcher-related error messages
    pub const ERR_DISPATCHER_WRITE_LOCK: &str = "Failed to acquire write lock on dispatcher";
    pub const ERR_DISPATCHER_READ_LOCK: &str = "Failed to acquire read lock on dispatcher";

    /// Engine state errors
    pub const ERR_PENDING_LOCK: &str = "Failed to acquire pending-request table lock";
    pub const ERR_STATE_LOCK: &str = "Failed to acquire connection state lock";
    pub const ERR_ASSEMBLER_LOCK: &str = "Failed to acquire frame assembler lock";
    pub const ERR_REGISTRY_LOCK: &str = "Failed to acquire device registry lock";
    pub const ERR_TRACE_WRITER_LOCK: &str = "Failed to acquire trace writer lock";

    /// Transport errors
    pub const ERR_TRANSPORT_CLOSED: &str = "Transport writer is closed";
    pub const ERR_OUTBOX_CLOSED: &str = "Engine outbox is closed";

    /// Handshake errors
    pub const ERR_HANDSHAKE_REJECTED: &str = "Connect request was not acknowledged";

    /// Encoding errors
    pub const ERR_INVALID_HEX: &str = "Invalid hex string";
    pub const ERR_INVALID_BASE64: &str = "Invalid base64 string";
    pub const ERR_INVALID_UTF8: &str = "Invalid UTF-8 text";
    pub const ERR_SHORT_READ: &str = "Not enough bytes remaining in buffer";
}

/// ProtocolError is the primary error type for all bridge operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Record encoding error: {0}")]
    RecordEncoding(#[from] serde_json::Error),

    #[error("Malformed frame")]
    MalformedFrame,

    #[error("Frame too large: {0} bytes")]
    OversizedFrame(usize),

    #[error("Unknown payload type: {0}")]
    UnknownPayloadType(String),

    #[error("Timed out waiting for response")]
    ResponseTimeout,

    #[error("Remote application error: {}", .0.message)]
    ApplicationError(ErrorResponse),

    #[error("Unmapped response type: {}", .0.type_tag)]
    UnmappedResponseType(Payload),

    #[error("Unexpected message type: expected {expected}, got {actual}")]
    UnexpectedMessage { expected: String, actual: String },

    #[error("Disconnected")]
    Disconnected,

    #[error("Invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
