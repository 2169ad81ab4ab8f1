//! # Protocol Layer
//!
//! Typed request/response exchanges over a framed byte stream.
//!
//! ## Components
//! - **Message**: `TypedMessage`/`Exchange` traits and the type-tag registry
//! - **Handshake**: idle → awaiting-handshake → active connection lifecycle
//! - **Dispatcher**: ordered plugin list and the plugin push channel
//! - **Engine**: reassembly, correlation, timeouts and dispatch for one connection
//! - **Registry**: companion-side ownership of connected devices by id
//!
//! ## Flow
//! ```text
//! companion                         device
//!   connect()  --Connect.Request-->   idle/awaiting → active
//!              <--Connect.Response--
//!   send_and_await(req) --req-->      plugin 1 → None, plugin 2 → Some(resp)
//!              <--resp (same id)--
//! ```

pub mod dispatcher;
pub mod engine;
pub mod handshake;
pub mod message;
pub mod registry;

pub use dispatcher::{Dispatcher, Outbox, Plugin};
pub use engine::ProtocolEngine;
pub use handshake::ConnectionState;
pub use message::{ErrorResponse, Exchange, InboundMessage, MessageKind, TypeRegistry, TypedMessage};
pub use registry::{DeviceHandle, DeviceId, DeviceRegistry};

#[cfg(test)]
mod tests;
