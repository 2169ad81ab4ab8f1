//! # Utility Modules
//!
//! Supporting utilities for observability.
//!
//! ## Components
//! - **Logging**: `tracing-subscriber` setup from `LoggingConfig`
//! - **Metrics**: thread-safe counters for frame and request flow

pub mod logging;
pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};
