//! # Protocol Engine
//!
//! Turns a chunked byte stream into typed, correlated exchanges.
//!
//! Inbound: chunk → [`FrameAssembler`] → COBS decode → [`Envelope`] → either the
//! pending request waiting on that id, the built-in connect handling, or the
//! plugin [`Dispatcher`]. Outbound: typed message → envelope with a fresh id →
//! COBS frame → [`Transport::write`].
//!
//! Nothing on the inbound path is fatal. Malformed frames, undecodable envelopes
//! and unknown type tags are logged, counted and dropped. Errors reach only the
//! caller of [`ProtocolEngine::send_and_await`].
//!
//! ## Concurrency
//! Chunks must be fed from one task, in arrival order ([`ProtocolEngine::run`]
//! does this). Any number of tasks may have requests in flight at once; each
//! waits on its own oneshot keyed by correlation id. Locks are never held
//! across an await point.

use crate::config::ProtocolConfig;
use crate::core::codec::FrameAssembler;
use crate::core::cobs;
use crate::core::envelope::{CorrelationId, Envelope, Payload};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::{Dispatcher, Outbox, Plugin};
use crate::protocol::handshake::{ConnectionState, HandshakeEvent};
use crate::protocol::message::{
    Connect, ConnectRequest, ConnectResponse, ErrorResponse, Exchange, InboundMessage,
    MessageKind, TypeRegistry, TypedMessage,
};
use crate::transport::{Transport, TransportEvent};
use crate::utils::metrics::Metrics;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, instrument, warn};

type Waiter = oneshot::Sender<Result<Payload>>;

struct PendingRequest {
    sender: Waiter,
    issued_at: Instant,
    timeout: Option<Duration>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    assembler: Mutex<FrameAssembler>,
    pending: Mutex<HashMap<CorrelationId, PendingRequest>>,
    state: Mutex<ConnectionState>,
    dispatcher: Dispatcher,
    registry: RwLock<TypeRegistry>,
    config: ProtocolConfig,
    metrics: Arc<Metrics>,
    outbox_tx: mpsc::UnboundedSender<Payload>,
    outbox_rx: Mutex<Option<mpsc::UnboundedReceiver<Payload>>>,
}

/// One logical connection's protocol state. Cheap to clone.
#[derive(Clone)]
pub struct ProtocolEngine {
    inner: Arc<Inner>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, message: &'static str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| ProtocolError::Custom(message.to_string()))
}

/// Removes the pending entry if the awaiting future is dropped or times out
struct PendingGuard<'a> {
    engine: &'a ProtocolEngine,
    id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.engine.inner.pending.lock() {
            pending.remove(&self.id);
        }
    }
}

impl ProtocolEngine {
    pub fn new(transport: Arc<dyn Transport>, config: ProtocolConfig) -> Self {
        Self::with_registry(transport, config, TypeRegistry::new())
    }

    pub fn with_registry(
        transport: Arc<dyn Transport>,
        config: ProtocolConfig,
        registry: TypeRegistry,
    ) -> Self {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                transport,
                assembler: Mutex::new(FrameAssembler::with_max_frame_size(config.max_frame_size)),
                pending: Mutex::new(HashMap::new()),
                state: Mutex::new(ConnectionState::Idle),
                dispatcher: Dispatcher::new(),
                registry: RwLock::new(registry),
                config,
                metrics: Arc::new(Metrics::new()),
                outbox_tx,
                outbox_rx: Mutex::new(Some(outbox_rx)),
            }),
        }
    }

    /// Register a request/response pair so inbound envelopes carrying either tag resolve
    pub fn register_exchange<E: Exchange>(&self) -> Result<()> {
        self.inner
            .registry
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_REGISTRY_LOCK.to_string()))?
            .register_exchange::<E>();
        Ok(())
    }

    pub fn register_type<M: TypedMessage>(&self, kind: MessageKind) -> Result<()> {
        self.inner
            .registry
            .write()
            .map_err(|_| ProtocolError::Custom(constants::ERR_REGISTRY_LOCK.to_string()))?
            .register::<M>(kind);
        Ok(())
    }

    /// Append a plugin to the dispatch list and hand it the push channel
    pub fn register_plugin(&self, plugin: Arc<dyn Plugin>) -> Result<()> {
        plugin.attach(self.outbox());
        self.inner.dispatcher.register(plugin)
    }

    pub fn outbox(&self) -> Outbox {
        Outbox::new(self.inner.outbox_tx.clone())
    }

    pub fn state(&self) -> ConnectionState {
        self.inner
            .state
            .lock()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Idle)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.inner.config
    }

    fn transition(&self, event: HandshakeEvent) -> Result<ConnectionState> {
        let mut state = lock(&self.inner.state, constants::ERR_STATE_LOCK)?;
        *state = state.on_event(event);
        Ok(*state)
    }

    /// Transport came up; wait for the companion's connect request
    pub fn on_connected(&self) -> Result<()> {
        self.transition(HandshakeEvent::HandshakeSent)?;
        Ok(())
    }

    /// Feed one inbound chunk. Every frame it completes is processed before returning.
    pub fn on_bytes_received(&self, chunk: &[u8]) -> Result<()> {
        self.inner.metrics.chunk_received(chunk.len() as u64);
        let frames = lock(&self.inner.assembler, constants::ERR_ASSEMBLER_LOCK)?.push(chunk);
        for frame in frames {
            self.inner.metrics.frame_received();
            self.handle_frame(&frame)?;
        }
        Ok(())
    }

    fn handle_frame(&self, stuffed: &[u8]) -> Result<()> {
        let raw = match cobs::decode(stuffed) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(len = stuffed.len(), error = %e, "Dropping malformed frame");
                self.inner.metrics.malformed_frame();
                return Ok(());
            }
        };

        let envelope = match Envelope::from_bytes(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(len = raw.len(), error = %e, "Dropping undecodable envelope");
                self.inner.metrics.malformed_frame();
                return Ok(());
            }
        };

        let kind = self
            .inner
            .registry
            .read()
            .map_err(|_| ProtocolError::Custom(constants::ERR_REGISTRY_LOCK.to_string()))?
            .resolve(&envelope.payload.type_tag);

        let Some(kind) = kind else {
            let err = ProtocolError::UnknownPayloadType(envelope.payload.type_tag);
            warn!(id = %envelope.id, error = %err, "Dropping envelope");
            self.inner.metrics.unknown_type();
            return Ok(());
        };

        let waiter = lock(&self.inner.pending, constants::ERR_PENDING_LOCK)?.remove(&envelope.id);
        if let Some(pending) = waiter {
            debug!(
                id = %envelope.id,
                tag = %envelope.payload.type_tag,
                elapsed_ms = pending.issued_at.elapsed().as_millis(),
                "Matched response"
            );
            self.inner.metrics.response_matched();
            // The caller may have given up between removal and send
            let _ = pending.sender.send(Ok(envelope.payload));
            return Ok(());
        }

        let message = InboundMessage {
            id: envelope.id,
            kind,
            payload: envelope.payload,
            received_at: Instant::now(),
        };

        match kind {
            MessageKind::Request => self.handle_request(message),
            MessageKind::Response | MessageKind::Error => {
                debug!(
                    id = %message.id,
                    tag = %message.payload.type_tag,
                    "Ignoring reply with no pending request"
                );
                Ok(())
            }
        }
    }

    fn handle_request(&self, message: InboundMessage) -> Result<()> {
        if message.is::<ConnectRequest>() {
            self.transition(HandshakeEvent::HandshakeAck)?;
            if let Err(e) = self.respond(&message, &ConnectResponse {}) {
                warn!(id = %message.id, error = %e, "Failed to acknowledge connect");
            }
            return Ok(());
        }

        if !self.state().is_active() {
            debug!(
                id = %message.id,
                tag = %message.payload.type_tag,
                state = %self.state(),
                "Dropping request before handshake"
            );
            return Ok(());
        }

        match self.inner.dispatcher.dispatch(&message)? {
            Some(response) => {
                self.inner.metrics.request_handled();
                if let Err(e) = self.respond_payload(message.id, response) {
                    warn!(id = %message.id, error = %e, "Failed to send response");
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn write_envelope(&self, envelope: &Envelope) -> Result<()> {
        let framed = cobs::frame(&envelope.to_bytes()?);
        self.inner.metrics.frame_sent(framed.len() as u64);
        self.inner.transport.write(Bytes::from(framed))
    }

    /// Send `message` under a fresh id without waiting for anything
    pub fn send_one_way<M: TypedMessage>(&self, message: &M) -> Result<CorrelationId> {
        self.send_payload(message.to_payload()?)
    }

    pub fn send_payload(&self, payload: Payload) -> Result<CorrelationId> {
        let envelope = Envelope::new(payload);
        self.write_envelope(&envelope)?;
        debug!(id = %envelope.id, tag = %envelope.payload.type_tag, "Sent");
        Ok(envelope.id)
    }

    /// Answer `to`, reusing its correlation id
    pub fn respond<M: TypedMessage>(&self, to: &InboundMessage, message: &M) -> Result<()> {
        self.respond_payload(to.id, message.to_payload()?)
    }

    pub fn respond_payload(&self, id: CorrelationId, payload: Payload) -> Result<()> {
        debug!(id = %id, tag = %payload.type_tag, "Responding");
        self.write_envelope(&Envelope::reply(id, payload))
    }

    /// Send a request and wait up to the configured response timeout for its reply
    pub async fn send_and_await<E: Exchange>(&self, request: &E::Request) -> Result<E::Response> {
        self.send_and_await_with_timeout::<E>(request, Some(self.inner.config.response_timeout))
            .await
    }

    /// Send a request and wait for its reply; `None` waits until a reply or disconnect.
    ///
    /// # Errors
    /// - [`ProtocolError::ResponseTimeout`] if nothing arrives in time
    /// - [`ProtocolError::ApplicationError`] if the peer answered with an [`ErrorResponse`]
    /// - [`ProtocolError::UnmappedResponseType`] for any other reply type
    /// - [`ProtocolError::Disconnected`] if the connection went away first
    #[instrument(skip(self, request), fields(request = <E::Request as TypedMessage>::TYPE_TAG))]
    pub async fn send_and_await_with_timeout<E: Exchange>(
        &self,
        request: &E::Request,
        timeout: Option<Duration>,
    ) -> Result<E::Response> {
        let envelope = Envelope::new(request.to_payload()?);
        let id = envelope.id;
        let (tx, rx) = oneshot::channel();

        // Registered before writing so an immediate reply finds its waiter
        lock(&self.inner.pending, constants::ERR_PENDING_LOCK)?.insert(
            id,
            PendingRequest {
                sender: tx,
                issued_at: Instant::now(),
                timeout,
            },
        );
        let _guard = PendingGuard { engine: self, id };

        self.write_envelope(&envelope)?;
        self.inner.metrics.request_sent();
        debug!(id = %id, "Awaiting response");

        let outcome = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    warn!(id = %id, timeout_ms = limit.as_millis(), "Response timed out");
                    self.inner.metrics.timeout();
                    return Err(ProtocolError::ResponseTimeout);
                }
            },
            None => rx.await,
        };

        let payload = outcome.map_err(|_| ProtocolError::Disconnected)??;
        interpret::<E::Response>(payload)
    }

    /// Companion side of the handshake: send the connect request and wait for the ack
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Result<()> {
        self.transition(HandshakeEvent::HandshakeSent)?;
        let timeout = self.inner.config.handshake_timeout;

        match self
            .send_and_await_with_timeout::<Connect>(&ConnectRequest {}, Some(timeout))
            .await
        {
            Ok(ConnectResponse {}) => {
                self.transition(HandshakeEvent::HandshakeAck)?;
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Handshake failed");
                self.transition(HandshakeEvent::Disconnected)?;
                match e {
                    ProtocolError::ApplicationError(_) | ProtocolError::UnmappedResponseType(_) => {
                        Err(ProtocolError::TransportError(
                            constants::ERR_HANDSHAKE_REJECTED.to_string(),
                        ))
                    }
                    other => Err(other),
                }
            }
        }
    }

    /// Transport lost: fail every pending request, reset state and reassembly
    pub fn on_disconnected(&self) -> Result<()> {
        let drained: Vec<(CorrelationId, PendingRequest)> =
            lock(&self.inner.pending, constants::ERR_PENDING_LOCK)?
                .drain()
                .collect();

        if !drained.is_empty() {
            info!(count = drained.len(), "Cancelling pending requests");
            self.inner.metrics.cancelled(drained.len() as u64);
        }
        for (id, pending) in drained {
            debug!(id = %id, timeout = ?pending.timeout, "Cancelled");
            let _ = pending.sender.send(Err(ProtocolError::Disconnected));
        }

        lock(&self.inner.assembler, constants::ERR_ASSEMBLER_LOCK)?.reset();
        self.transition(HandshakeEvent::Disconnected)?;
        Ok(())
    }

    /// Close the transport and tear the connection down locally
    pub fn close(&self) -> Result<()> {
        self.inner.transport.close();
        self.on_disconnected()
    }

    fn flush_pushed(&self, payload: Payload) -> Result<()> {
        if self.state().is_active() {
            self.send_payload(payload)?;
        } else {
            debug!(tag = %payload.type_tag, "Dropping push while not connected");
        }
        Ok(())
    }

    /// Drive the engine from a transport's event channel until it disconnects.
    ///
    /// Also sends whatever plugins push through the [`Outbox`]. May be called
    /// again with a new channel after a reconnect.
    #[instrument(skip_all)]
    pub async fn run(&self, mut events: mpsc::UnboundedReceiver<TransportEvent>) -> Result<()> {
        let mut pushed = lock(&self.inner.outbox_rx, constants::ERR_OUTBOX_CLOSED)?
            .take()
            .ok_or_else(|| ProtocolError::Custom(constants::ERR_OUTBOX_CLOSED.to_string()))?;

        let result = loop {
            tokio::select! {
                biased;
                event = events.recv() => match event {
                    Some(TransportEvent::Connected) => {
                        if let Err(e) = self.on_connected() {
                            break Err(e);
                        }
                    }
                    Some(TransportEvent::Data(chunk)) => {
                        if let Err(e) = self.on_bytes_received(&chunk) {
                            break Err(e);
                        }
                    }
                    Some(TransportEvent::Disconnected) | None => break Ok(()),
                },
                Some(payload) = pushed.recv() => {
                    if let Err(e) = self.flush_pushed(payload) {
                        warn!(error = %e, "Failed to send pushed message");
                    }
                }
            }
        };

        let teardown = self.on_disconnected();
        if let Ok(mut slot) = self.inner.outbox_rx.lock() {
            *slot = Some(pushed);
        }
        self.inner.metrics.log_metrics();
        result.and(teardown)
    }
}

fn interpret<R: TypedMessage>(payload: Payload) -> Result<R> {
    if payload.type_tag == R::TYPE_TAG {
        R::from_payload(&payload)
    } else if payload.type_tag == ErrorResponse::TYPE_TAG {
        Err(ProtocolError::ApplicationError(ErrorResponse::from_payload(
            &payload,
        )?))
    } else {
        Err(ProtocolError::UnmappedResponseType(payload))
    }
}
