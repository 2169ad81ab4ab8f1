use crate::core::envelope::Payload;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::{ErrorResponse, InboundMessage, TypedMessage};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Handler for inbound requests.
///
/// `handle` returns `Ok(None)` for messages the plugin does not own, letting the
/// next plugin try. Plugins that push unsolicited messages keep the [`Outbox`]
/// handed to them in [`attach`](Plugin::attach).
pub trait Plugin: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once when the plugin is registered with an engine
    fn attach(&self, _outbox: Outbox) {}

    fn handle(&self, message: &InboundMessage) -> Result<Option<Payload>>;
}

/// Sending half of the engine's push channel.
///
/// Pushed messages go out as one-way envelopes while the connection is active and
/// are dropped otherwise.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Payload>,
}

impl Outbox {
    pub(crate) fn new(tx: mpsc::UnboundedSender<Payload>) -> Self {
        Self { tx }
    }

    pub fn push<M: TypedMessage>(&self, message: &M) -> Result<()> {
        self.push_payload(message.to_payload()?)
    }

    pub fn push_payload(&self, payload: Payload) -> Result<()> {
        self.tx
            .send(payload)
            .map_err(|_| ProtocolError::TransportError(constants::ERR_OUTBOX_CLOSED.to_string()))
    }
}

/// Ordered list of plugins; the first to answer wins.
pub struct Dispatcher {
    plugins: Arc<RwLock<Vec<Arc<dyn Plugin>>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            plugins: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn register(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        let mut plugins = self.plugins.write().map_err(|_| {
            ProtocolError::Custom(constants::ERR_DISPATCHER_WRITE_LOCK.to_string())
        })?;

        debug!(plugin = plugin.name(), position = plugins.len(), "Registered plugin");
        plugins.push(plugin);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.plugins.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Offer `msg` to each plugin in registration order.
    ///
    /// Returns the first response produced. A plugin error stops dispatch and is
    /// turned into an [`ErrorResponse`] for the requester.
    pub fn dispatch(&self, msg: &InboundMessage) -> Result<Option<Payload>> {
        // Snapshot so handlers run without the lock held
        let plugins: Vec<Arc<dyn Plugin>> = self
            .plugins
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_DISPATCHER_READ_LOCK.to_string()))?
            .clone();

        for plugin in plugins {
            match plugin.handle(msg) {
                Ok(Some(response)) => {
                    debug!(plugin = plugin.name(), id = %msg.id, "Plugin answered request");
                    return Ok(Some(response));
                }
                Ok(None) => continue,
                Err(e) => {
                    warn!(plugin = plugin.name(), id = %msg.id, error = %e, "Plugin failed to handle request");
                    return ErrorResponse::new(e.to_string()).to_payload().map(Some);
                }
            }
        }

        debug!(id = %msg.id, tag = %msg.payload.type_tag, "No plugin handled request");
        Ok(None)
    }
}
