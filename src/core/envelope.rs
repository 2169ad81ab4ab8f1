//! Envelope: the unit exchanged once a frame has been unstuffed.
//!
//! ```text
//! Envelope { id: CorrelationId(16 bytes), payload: Payload { type_tag, body } }
//! ```
//! The envelope is bincode-encoded inside the frame. Requests, responses, error
//! replies and unsolicited pushes share this shape and differ only by type tag.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque 16-byte identifier tying a request to its response
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId([u8; 16]);

impl CorrelationId {
    pub const LEN: usize = 16;

    /// Fresh random id
    pub fn random() -> Self {
        Self(rand::random())
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    // 8-4-4-4-12 grouping, matching how the companion tool prints ids
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = hex::encode(self.0);
        write!(
            f,
            "{}-{}-{}-{}-{}",
            &h[0..8],
            &h[8..12],
            &h[12..16],
            &h[16..20],
            &h[20..32]
        )
    }
}

impl fmt::Debug for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CorrelationId({self})")
    }
}

/// Type-tagged opaque body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub type_tag: String,
    pub body: Vec<u8>,
}

impl Payload {
    pub fn new(type_tag: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            type_tag: type_tag.into(),
            body,
        }
    }
}

/// Correlation id plus typed payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub id: CorrelationId,
    pub payload: Payload,
}

impl Envelope {
    /// Envelope with a freshly allocated id
    pub fn new(payload: Payload) -> Self {
        Self {
            id: CorrelationId::random(),
            payload,
        }
    }

    /// Envelope answering `id`
    pub fn reply(id: CorrelationId, payload: Payload) -> Self {
        Self { id, payload }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
