//! # devbridge
//!
//! Device-side debugging bridge: typed request/response messaging with a desktop
//! companion over any byte stream, and encrypted on-disk telemetry.
//!
//! ## Layers
//! - [`core`]: secure buffers, COBS framing, envelopes
//! - [`crypto`]: ChaCha20 keystream engine and log key derivation
//! - [`protocol`]: correlation engine, handshake, plugins, device registry
//! - [`transport`]: in-memory and tokio stream transports
//! - [`logstore`]: encrypted log files, `tracing` capture, network traces, log and trace plugins
//!
//! ## Example
//! ```rust,no_run
//! use devbridge::config::BridgeConfig;
//! use devbridge::protocol::ProtocolEngine;
//! use devbridge::transport::stream;
//! use std::sync::Arc;
//!
//! # async fn demo() -> devbridge::error::Result<()> {
//! let config = BridgeConfig::default();
//! let (transport, events) = stream::connect(&config.transport).await?;
//! let engine = ProtocolEngine::new(Arc::new(transport), config.protocol.clone());
//!
//! let driver = engine.clone();
//! tokio::spawn(async move { driver.run(events).await });
//! engine.connect().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod logstore;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use error::{ProtocolError, Result};
