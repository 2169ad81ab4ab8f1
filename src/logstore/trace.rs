//! Network trace store.
//!
//! Request, response and error records for outgoing HTTP traffic, kept apart
//! from the application logs:
//!
//! ```text
//! <trace_directory>/<session>.log:
//!     frame(encrypt(json(trace record 1))) frame(encrypt(json(trace record 2))) ...
//! ```
//! The file format and keying are the same as the log store's. Each session is
//! its own file, keyed by the session name. Capturing the traffic is left to the
//! application, which hands finished records to a [`TraceRecorder`].

use super::layer::LiveFeed;
use super::plugin::TraceLiveRecord;
use super::reader::LogReader;
use super::record::now_millis;
use super::writer::LogWriter;
use super::{check_component, list_log_stems, session_name, LOG_EXTENSION};
use crate::config::LogStoreConfig;
use crate::crypto::{derive_key, KeyMaterial};
use crate::error::{constants, ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tracing::{debug, instrument};
use zeroize::Zeroizing;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl Header {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// What happened to one request. Times are milliseconds since the Unix epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TraceEvent {
    Request {
        time: u64,
        method: String,
        url: String,
        #[serde(default)]
        headers: Vec<Header>,
        #[serde(default, with = "body_base64")]
        body: Option<Vec<u8>>,
        #[serde(default)]
        cache_policy: Option<String>,
    },
    Response {
        time: u64,
        code: u16,
        #[serde(default)]
        headers: Vec<Header>,
        #[serde(default, with = "body_base64")]
        body: Option<Vec<u8>>,
    },
    Error {
        time: u64,
        error: String,
    },
}

/// One traced event. A request and its response or error share the same `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: String,
    pub data: TraceEvent,
}

impl TraceRecord {
    pub fn request(
        id: impl Into<String>,
        method: impl Into<String>,
        url: impl Into<String>,
        headers: Vec<Header>,
        body: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id: id.into(),
            data: TraceEvent::Request {
                time: now_millis(),
                method: method.into(),
                url: url.into(),
                headers,
                body,
                cache_policy: None,
            },
        }
    }

    pub fn response(id: impl Into<String>, code: u16, headers: Vec<Header>, body: Option<Vec<u8>>) -> Self {
        Self {
            id: id.into(),
            data: TraceEvent::Response {
                time: now_millis(),
                code,
                headers,
                body,
            },
        }
    }

    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: TraceEvent::Error {
                time: now_millis(),
                error: error.into(),
            },
        }
    }
}

/// Encrypted network traces, one file per session under a single directory
pub struct TraceStore {
    root: PathBuf,
    passphrase: Zeroizing<String>,
    device_id: String,
    session: String,
}

impl TraceStore {
    pub fn new(root: impl Into<PathBuf>, passphrase: &str, device_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            passphrase: Zeroizing::new(passphrase.to_string()),
            device_id: device_id.into(),
            session: session_name(SystemTime::now()),
        }
    }

    pub fn from_config(config: &LogStoreConfig, passphrase: &str) -> Self {
        Self::new(&config.trace_directory, passphrase, config.device_id.clone())
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn session(&self) -> &str {
        &self.session
    }

    /// `<root>/<session>.log`
    pub fn path(&self, session: &str) -> Result<PathBuf> {
        check_component(session)?;
        Ok(self.root.join(format!("{session}.{LOG_EXTENSION}")))
    }

    pub fn material(&self, session: &str) -> KeyMaterial {
        derive_key(session, &self.passphrase, &self.device_id)
    }

    /// Recorded sessions, oldest first
    pub fn sessions(&self) -> Result<Vec<String>> {
        list_log_stems(&self.root)
    }

    #[instrument(skip(self))]
    pub fn read(&self, session: &str) -> Result<Vec<TraceRecord>> {
        let path = self.path(session)?;
        let bytes = Zeroizing::new(std::fs::read(&path)?);
        let records: Vec<TraceRecord> = LogReader::new(&self.material(session)).read_json(&bytes);
        debug!(records = records.len(), "Read trace");
        Ok(records)
    }

    /// Recorder appending to the current session, forwarding through `feed`
    pub fn open_recorder(&self, feed: LiveFeed) -> Result<TraceRecorder> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.path(&self.session)?;
        let writer = LogWriter::open(&path, &self.material(&self.session))?;
        Ok(TraceRecorder {
            session: self.session.clone(),
            writer: Mutex::new(writer),
            feed,
        })
    }
}

/// Appends trace records to the current session and forwards them live
pub struct TraceRecorder {
    session: String,
    writer: Mutex<LogWriter<File>>,
    feed: LiveFeed,
}

impl TraceRecorder {
    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn record(&self, record: &TraceRecord) -> Result<()> {
        let json = Zeroizing::new(serde_json::to_vec(record)?);
        self.writer
            .lock()
            .map_err(|_| ProtocolError::Custom(constants::ERR_TRACE_WRITER_LOCK.to_string()))?
            .append(&json)?;
        self.feed.publish_message(&TraceLiveRecord {
            label: self.session.clone(),
            record: record.clone(),
        });
        Ok(())
    }

    pub fn records_written(&self) -> u64 {
        self.writer.lock().map(|w| w.records_written()).unwrap_or(0)
    }
}

/// Optional bodies as standard padded base64
mod body_base64 {
    use base64::Engine as _;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error> {
        match body {
            Some(bytes) => {
                serializer.serialize_some(&base64::engine::general_purpose::STANDARD.encode(bytes))
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(text) => base64::engine::general_purpose::STANDARD
                .decode(text)
                .map(Some)
                .map_err(D::Error::custom),
            None => Ok(None),
        }
    }
}
