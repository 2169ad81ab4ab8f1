//! Typed messages and the type-tag registry.
//!
//! Message schemas are owned by whoever defines them; the bridge only needs a
//! stable type tag per message and a bincode body. A [`TypeRegistry`] maps known
//! tags to their [`MessageKind`]; an inbound payload whose tag is not registered
//! resolves to `None` and is dropped by the engine.

use crate::core::envelope::{CorrelationId, Payload};
use crate::error::{ProtocolError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::time::Instant;

/// A message with a stable wire type tag
pub trait TypedMessage: Serialize + DeserializeOwned + Send + 'static {
    const TYPE_TAG: &'static str;

    /// Wrap into a tagged payload
    fn to_payload(&self) -> Result<Payload> {
        Ok(Payload::new(Self::TYPE_TAG, bincode::serialize(self)?))
    }

    /// Decode from a payload, checking the tag first
    fn from_payload(payload: &Payload) -> Result<Self> {
        if payload.type_tag != Self::TYPE_TAG {
            return Err(ProtocolError::UnexpectedMessage {
                expected: Self::TYPE_TAG.to_string(),
                actual: payload.type_tag.clone(),
            });
        }
        Ok(bincode::deserialize(&payload.body)?)
    }
}

/// A request type paired with the response type it expects
pub trait Exchange {
    type Request: TypedMessage;
    type Response: TypedMessage;
}

/// Role of a registered type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Inbound request or unsolicited push, offered to plugins
    Request,
    /// Reply to an earlier request
    Response,
    /// Application-level error reply
    Error,
}

/// Connect request sent by the companion to activate the device session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {}

impl TypedMessage for ConnectRequest {
    const TYPE_TAG: &'static str = "devbridge.Connect.Request";
}

/// Acknowledgement of [`ConnectRequest`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {}

impl TypedMessage for ConnectResponse {
    const TYPE_TAG: &'static str = "devbridge.Connect.Response";
}

/// The connect exchange
pub struct Connect;

impl Exchange for Connect {
    type Request = ConnectRequest;
    type Response = ConnectResponse;
}

/// Application-level error carried back to the requester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl TypedMessage for ErrorResponse {
    const TYPE_TAG: &'static str = "devbridge.ErrorResponse";
}

/// Mapping from type tag to message kind
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    kinds: HashMap<Cow<'static, str>, MessageKind>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Registry holding the built-in connect and error types
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register_exchange::<Connect>();
        registry.register::<ErrorResponse>(MessageKind::Error);
        registry
    }

    /// Registry with nothing registered
    pub fn empty() -> Self {
        Self {
            kinds: HashMap::new(),
        }
    }

    pub fn register<M: TypedMessage>(&mut self, kind: MessageKind) -> &mut Self {
        self.kinds.insert(Cow::Borrowed(M::TYPE_TAG), kind);
        self
    }

    /// Register both halves of an exchange
    pub fn register_exchange<E: Exchange>(&mut self) -> &mut Self {
        self.register::<E::Request>(MessageKind::Request);
        self.register::<E::Response>(MessageKind::Response);
        self
    }

    /// Register a tag that is not backed by a Rust type
    pub fn register_tag(&mut self, tag: impl Into<String>, kind: MessageKind) -> &mut Self {
        self.kinds.insert(Cow::Owned(tag.into()), kind);
        self
    }

    pub fn resolve(&self, type_tag: &str) -> Option<MessageKind> {
        self.kinds.get(type_tag).copied()
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// A decoded inbound envelope whose tag resolved through the registry
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub id: CorrelationId,
    pub kind: MessageKind,
    pub payload: Payload,
    pub received_at: Instant,
}

impl InboundMessage {
    pub fn is<M: TypedMessage>(&self) -> bool {
        self.payload.type_tag == M::TYPE_TAG
    }

    /// Decode the payload as `M`
    pub fn decode<M: TypedMessage>(&self) -> Result<M> {
        M::from_payload(&self.payload)
    }
}
