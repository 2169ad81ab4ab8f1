use super::layer::LiveFeed;
use super::record::LogRecord;
use super::trace::{TraceRecord, TraceStore};
use super::LogStore;
use crate::core::envelope::Payload;
use crate::error::Result;
use crate::protocol::dispatcher::{Outbox, Plugin};
use crate::protocol::engine::ProtocolEngine;
use crate::protocol::message::{Exchange, InboundMessage, MessageKind, TypedMessage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadLogRequest {
    pub label: String,
    pub name: String,
}

impl TypedMessage for ReadLogRequest {
    const TYPE_TAG: &'static str = "devbridge.Log.Read.Request";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadLogResponse {
    pub records: Vec<LogRecord>,
}

impl TypedMessage for ReadLogResponse {
    const TYPE_TAG: &'static str = "devbridge.Log.Read.Response";
}

pub struct ReadLog;

impl Exchange for ReadLog {
    type Request = ReadLogRequest;
    type Response = ReadLogResponse;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLogsRequest {
    pub label: String,
}

impl TypedMessage for ListLogsRequest {
    const TYPE_TAG: &'static str = "devbridge.Log.List.Request";
}

/// A stored log or trace session; `is_active` marks the one this process is writing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub name: String,
    pub is_active: bool,
}

fn entries(names: Vec<String>, active: &str) -> Vec<LogEntry> {
    names
        .into_iter()
        .map(|name| LogEntry {
            is_active: name == active,
            name,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLogsResponse {
    pub logs: Vec<LogEntry>,
}

impl TypedMessage for ListLogsResponse {
    const TYPE_TAG: &'static str = "devbridge.Log.List.Response";
}

pub struct ListLogs;

impl Exchange for ListLogs {
    type Request = ListLogsRequest;
    type Response = ListLogsResponse;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLabelsRequest {}

impl TypedMessage for ListLabelsRequest {
    const TYPE_TAG: &'static str = "devbridge.Log.Labels.Request";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListLabelsResponse {
    pub labels: Vec<String>,
}

impl TypedMessage for ListLabelsResponse {
    const TYPE_TAG: &'static str = "devbridge.Log.Labels.Response";
}

pub struct ListLabels;

impl Exchange for ListLabels {
    type Request = ListLabelsRequest;
    type Response = ListLabelsResponse;
}

/// Turn live forwarding on or off. Answered with the new setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveLogRequest {
    pub enabled: bool,
}

impl TypedMessage for LiveLogRequest {
    const TYPE_TAG: &'static str = "devbridge.Log.Live.Request";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveLogResponse {
    pub enabled: bool,
}

impl TypedMessage for LiveLogResponse {
    const TYPE_TAG: &'static str = "devbridge.Log.Live.Response";
}

pub struct LiveLog;

impl Exchange for LiveLog {
    type Request = LiveLogRequest;
    type Response = LiveLogResponse;
}

/// Record pushed to the companion while live forwarding is on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveLogRecord {
    pub record: LogRecord,
}

impl TypedMessage for LiveLogRecord {
    const TYPE_TAG: &'static str = "devbridge.Log.Live.Record";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTracesRequest {}

impl TypedMessage for ListTracesRequest {
    const TYPE_TAG: &'static str = "devbridge.Trace.Labels.Request";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTracesResponse {
    pub sessions: Vec<LogEntry>,
}

impl TypedMessage for ListTracesResponse {
    const TYPE_TAG: &'static str = "devbridge.Trace.Labels.Response";
}

pub struct ListTraces;

impl Exchange for ListTraces {
    type Request = ListTracesRequest;
    type Response = ListTracesResponse;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadTraceRequest {
    pub label: String,
}

impl TypedMessage for ReadTraceRequest {
    const TYPE_TAG: &'static str = "devbridge.Trace.Records.Request";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadTraceResponse {
    pub records: Vec<TraceRecord>,
}

impl TypedMessage for ReadTraceResponse {
    const TYPE_TAG: &'static str = "devbridge.Trace.Records.Response";
}

pub struct ReadTrace;

impl Exchange for ReadTrace {
    type Request = ReadTraceRequest;
    type Response = ReadTraceResponse;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveTraceRequest {
    pub enabled: bool,
}

impl TypedMessage for LiveTraceRequest {
    const TYPE_TAG: &'static str = "devbridge.Trace.Live.Request";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveTraceResponse {
    pub enabled: bool,
}

impl TypedMessage for LiveTraceResponse {
    const TYPE_TAG: &'static str = "devbridge.Trace.Live.Response";
}

pub struct LiveTrace;

impl Exchange for LiveTrace {
    type Request = LiveTraceRequest;
    type Response = LiveTraceResponse;
}

/// Trace record pushed while live tracing is on; `label` is the session it was written to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLiveRecord {
    pub label: String,
    pub record: TraceRecord,
}

impl TypedMessage for TraceLiveRecord {
    const TYPE_TAG: &'static str = "devbridge.Trace.Live.Record";
}

/// Register every log message type with `engine`. Both sides call this.
pub fn register_log_types(engine: &ProtocolEngine) -> Result<()> {
    engine.register_exchange::<ReadLog>()?;
    engine.register_exchange::<ListLogs>()?;
    engine.register_exchange::<ListLabels>()?;
    engine.register_exchange::<LiveLog>()?;
    engine.register_type::<LiveLogRecord>(MessageKind::Request)
}

/// Register every network trace message type with `engine`
pub fn register_trace_types(engine: &ProtocolEngine) -> Result<()> {
    engine.register_exchange::<ListTraces>()?;
    engine.register_exchange::<ReadTrace>()?;
    engine.register_exchange::<LiveTrace>()?;
    engine.register_type::<TraceLiveRecord>(MessageKind::Request)
}

/// Serves stored logs to the companion and toggles live forwarding
pub struct LogPlugin {
    store: Arc<LogStore>,
    feed: LiveFeed,
}

impl LogPlugin {
    pub fn new(store: Arc<LogStore>, feed: LiveFeed) -> Self {
        Self { store, feed }
    }
}

impl Plugin for LogPlugin {
    fn name(&self) -> &str {
        "log"
    }

    fn attach(&self, outbox: Outbox) {
        self.feed.set_outbox(outbox);
    }

    fn handle(&self, message: &InboundMessage) -> Result<Option<Payload>> {
        if message.is::<ReadLogRequest>() {
            let request: ReadLogRequest = message.decode()?;
            let records = self.store.read(&request.label, &request.name)?;
            debug!(label = %request.label, name = %request.name, records = records.len(), "Serving log");
            return ReadLogResponse { records }.to_payload().map(Some);
        }

        if message.is::<ListLogsRequest>() {
            let request: ListLogsRequest = message.decode()?;
            let names = self.store.list(&request.label)?;
            let logs = entries(names, self.store.session());
            return ListLogsResponse { logs }.to_payload().map(Some);
        }

        if message.is::<ListLabelsRequest>() {
            let labels = self.store.labels()?;
            return ListLabelsResponse { labels }.to_payload().map(Some);
        }

        if message.is::<LiveLogRequest>() {
            let request: LiveLogRequest = message.decode()?;
            self.feed.set_enabled(request.enabled);
            debug!(enabled = request.enabled, "Live log forwarding toggled");
            return LiveLogResponse {
                enabled: request.enabled,
            }
            .to_payload()
            .map(Some);
        }

        Ok(None)
    }
}

/// Serves recorded network traces and toggles live trace forwarding
pub struct TracePlugin {
    store: Arc<TraceStore>,
    feed: LiveFeed,
}

impl TracePlugin {
    pub fn new(store: Arc<TraceStore>, feed: LiveFeed) -> Self {
        Self { store, feed }
    }
}

impl Plugin for TracePlugin {
    fn name(&self) -> &str {
        "trace"
    }

    fn attach(&self, outbox: Outbox) {
        self.feed.set_outbox(outbox);
    }

    fn handle(&self, message: &InboundMessage) -> Result<Option<Payload>> {
        if message.is::<ListTracesRequest>() {
            let sessions = entries(self.store.sessions()?, self.store.session());
            return ListTracesResponse { sessions }.to_payload().map(Some);
        }

        if message.is::<ReadTraceRequest>() {
            let request: ReadTraceRequest = message.decode()?;
            let records = self.store.read(&request.label)?;
            debug!(label = %request.label, records = records.len(), "Serving trace");
            return ReadTraceResponse { records }.to_payload().map(Some);
        }

        if message.is::<LiveTraceRequest>() {
            let request: LiveTraceRequest = message.decode()?;
            self.feed.set_enabled(request.enabled);
            debug!(enabled = request.enabled, "Live trace forwarding toggled");
            return LiveTraceResponse {
                enabled: request.enabled,
            }
            .to_payload()
            .map(Some);
        }

        Ok(None)
    }
}
