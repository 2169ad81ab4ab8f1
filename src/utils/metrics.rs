//! Observability and Metrics
//!
//! Atomic counters for frame and request flow through the protocol engine.
//! Each engine owns an `Arc<Metrics>` and logs a snapshot when its run loop ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::info;

/// Counters for one engine
#[derive(Debug)]
pub struct Metrics {
    /// Raw bytes handed to the engine by the transport
    pub bytes_received: AtomicU64,
    /// Raw bytes written to the transport, delimiters included
    pub bytes_sent: AtomicU64,
    /// Complete frames taken out of reassembly
    pub frames_received: AtomicU64,
    /// Frames written
    pub frames_sent: AtomicU64,
    /// Frames dropped for bad stuffing or an undecodable envelope
    pub malformed_frames: AtomicU64,
    /// Envelopes dropped because their type tag is not registered
    pub unknown_types: AtomicU64,
    /// Requests issued with `send_and_await`
    pub requests_sent: AtomicU64,
    /// Responses matched to a pending request
    pub responses_matched: AtomicU64,
    /// Pending requests that timed out
    pub timeouts: AtomicU64,
    /// Pending requests failed by a disconnect
    pub cancelled: AtomicU64,
    /// Inbound requests answered by a plugin
    pub requests_handled: AtomicU64,
    start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            unknown_types: AtomicU64::new(0),
            requests_sent: AtomicU64::new(0),
            responses_matched: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            requests_handled: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn chunk_received(&self, byte_count: u64) {
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn frame_sent(&self, byte_count: u64) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unknown_type(&self) {
        self.unknown_types.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_matched(&self) {
        self.responses_matched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cancelled(&self, count: u64) {
        self.cancelled.fetch_add(count, Ordering::Relaxed);
    }

    pub fn request_handled(&self) {
        self.requests_handled.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            unknown_types: self.unknown_types.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses_matched: self.responses_matched.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            requests_handled: self.requests_handled.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn log_metrics(&self) {
        let s = self.snapshot();
        info!(
            bytes_received = s.bytes_received,
            bytes_sent = s.bytes_sent,
            frames_received = s.frames_received,
            frames_sent = s.frames_sent,
            malformed_frames = s.malformed_frames,
            unknown_types = s.unknown_types,
            requests_sent = s.requests_sent,
            responses_matched = s.responses_matched,
            timeouts = s.timeouts,
            cancelled = s.cancelled,
            requests_handled = s.requests_handled,
            uptime_seconds = s.uptime_seconds,
            "Bridge metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub frames_received: u64,
    pub frames_sent: u64,
    pub malformed_frames: u64,
    pub unknown_types: u64,
    pub requests_sent: u64,
    pub responses_matched: u64,
    pub timeouts: u64,
    pub cancelled: u64,
    pub requests_handled: u64,
    pub uptime_seconds: u64,
}
