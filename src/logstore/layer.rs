use super::plugin::LiveLogRecord;
use super::record::LogRecord;
use super::writer::LogWriter;
use crate::config::LogStoreConfig;
use crate::protocol::dispatcher::Outbox;
use crate::protocol::message::TypedMessage;
use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");
const OWN_TARGET_PREFIX: &str = concat!(env!("CARGO_CRATE_NAME"), "::");

thread_local! {
    static IN_LAYER: Cell<bool> = const { Cell::new(false) };
}

/// Forwarding switch for live records, shared by a producer and the plugin that toggles it
#[derive(Clone, Default)]
pub struct LiveFeed {
    enabled: Arc<AtomicBool>,
    outbox: Arc<Mutex<Option<Outbox>>>,
}

impl LiveFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed that starts switched on or off
    pub fn with_enabled(enabled: bool) -> Self {
        let feed = Self::default();
        feed.set_enabled(enabled);
        feed
    }

    /// Log forwarding feed, switched on when `live_log` is set
    pub fn from_config(config: &LogStoreConfig) -> Self {
        Self::with_enabled(config.live_log)
    }

    pub fn set_outbox(&self, outbox: Outbox) {
        if let Ok(mut slot) = self.outbox.lock() {
            *slot = Some(outbox);
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Push `record` to the companion if forwarding is on
    pub fn publish(&self, record: &LogRecord) {
        self.publish_message(&LiveLogRecord {
            record: record.clone(),
        });
    }

    /// Push any one-way message if forwarding is on. Dropped when no engine is attached.
    pub fn publish_message<M: TypedMessage>(&self, message: &M) {
        if !self.is_enabled() {
            return;
        }
        if let Ok(slot) = self.outbox.lock() {
            if let Some(outbox) = slot.as_ref() {
                let _ = outbox.push(message);
            }
        }
    }
}

/// `tracing` layer that appends every application event to an encrypted log.
///
/// Events emitted by this crate itself are not captured, so that forwarding a
/// record never produces another record.
pub struct EncryptedLogLayer<W: Write + Send + 'static = File> {
    label: String,
    writer: Arc<Mutex<LogWriter<W>>>,
    feed: LiveFeed,
}

impl<W: Write + Send + 'static> EncryptedLogLayer<W> {
    pub fn new(label: impl Into<String>, writer: LogWriter<W>, feed: LiveFeed) -> Self {
        Self {
            label: label.into(),
            writer: Arc::new(Mutex::new(writer)),
            feed,
        }
    }

    /// Shared handle to the underlying writer
    pub fn writer(&self) -> Arc<Mutex<LogWriter<W>>> {
        Arc::clone(&self.writer)
    }

    fn capture(&self, event: &Event<'_>) {
        let metadata = event.metadata();
        let mut message = String::new();
        let mut fields = BTreeMap::new();
        event.record(&mut RecordVisitor {
            message: &mut message,
            fields: &mut fields,
        });

        let mut record = LogRecord::new(
            self.label.clone(),
            metadata.level().to_string().to_ascii_lowercase(),
            message,
        )
        .with_location(metadata.file(), metadata.line());
        record.fields = fields;

        if let Ok(mut writer) = self.writer.lock() {
            // Nowhere to report a failed write without recursing
            let _ = writer.append_record(&record);
        }
        self.feed.publish(&record);
    }
}

impl<S, W> Layer<S> for EncryptedLogLayer<W>
where
    S: Subscriber,
    W: Write + Send + 'static,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let target = event.metadata().target();
        if target == OWN_TARGET || target.starts_with(OWN_TARGET_PREFIX) {
            return;
        }
        if IN_LAYER.with(|flag| flag.replace(true)) {
            return;
        }
        self.capture(event);
        IN_LAYER.with(|flag| flag.set(false));
    }
}

struct RecordVisitor<'a> {
    message: &'a mut String,
    fields: &'a mut BTreeMap<String, String>,
}

impl Visit for RecordVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }
}
