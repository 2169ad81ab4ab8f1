//! # Encrypted Log Store
//!
//! On-disk telemetry, encrypted per file.
//!
//! ## File Format
//! ```text
//! <directory>/<label>/<name>.log:
//!     frame(encrypt(json(record 1))) frame(encrypt(json(record 2))) ...
//! ```
//! Each file has its own keystream, keyed by `derive_key(name, passphrase,
//! device_id)` and running from block counter 0 across all of its records.
//! Files can only be decrypted front to back.
//!
//! A store fixes one session name when it is created (`session-<epoch ms>`);
//! every label written during the process lifetime goes to `<label>/<session>.log`,
//! and listings mark that session as the active one.
//!
//! ## Components
//! - **Record**: the JSON record shape
//! - **Writer / Reader**: append and replay one stream
//! - **Layer**: captures `tracing` events into a log, optionally forwarding them live
//! - **Plugin**: serves logs, network traces and live forwarding to the companion
//! - **Trace**: network request/response records in their own encrypted store
//!
//! ## Security
//! - No integrity protection: a tampered file decrypts to garbage, which is skipped
//! - The passphrase is zeroed when the store is dropped

pub mod layer;
pub mod plugin;
pub mod reader;
pub mod record;
pub mod trace;
pub mod writer;

pub use layer::{EncryptedLogLayer, LiveFeed};
pub use plugin::{LogPlugin, TracePlugin};
pub use reader::LogReader;
pub use record::LogRecord;
pub use trace::{TraceEvent, TraceRecord, TraceRecorder, TraceStore};
pub use writer::LogWriter;

use crate::config::LogStoreConfig;
use crate::crypto::{derive_key, KeyMaterial};
use crate::error::{ProtocolError, Result};
use std::fs::File;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

const LOG_EXTENSION: &str = "log";

/// Session name for a process started at `at`. Names sort in start order.
pub fn session_name(at: SystemTime) -> String {
    let millis = at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("session-{millis:013}")
}

/// Maps `(label, name)` to encrypted log files under one directory
pub struct LogStore {
    root: PathBuf,
    passphrase: Zeroizing<String>,
    device_id: String,
    session: String,
}

impl LogStore {
    pub fn new(root: impl Into<PathBuf>, passphrase: &str, device_id: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            passphrase: Zeroizing::new(passphrase.to_string()),
            device_id: device_id.into(),
            session: session_name(SystemTime::now()),
        }
    }

    pub fn from_config(config: &LogStoreConfig, passphrase: &str) -> Self {
        Self::new(&config.directory, passphrase, config.device_id.clone())
    }

    /// Replace the generated session name
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = session.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Name of the log this process writes for every label
    pub fn session(&self) -> &str {
        &self.session
    }

    /// `<root>/<label>/<name>.log`; both parts must be single path components
    pub fn path(&self, label: &str, name: &str) -> Result<PathBuf> {
        check_component(label)?;
        check_component(name)?;
        Ok(self
            .root
            .join(label)
            .join(format!("{name}.{LOG_EXTENSION}")))
    }

    /// Key material for the log called `name`
    pub fn material(&self, name: &str) -> KeyMaterial {
        derive_key(name, &self.passphrase, &self.device_id)
    }

    pub fn open_writer(&self, label: &str, name: &str) -> Result<LogWriter<File>> {
        let path = self.path(label, name)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        LogWriter::open(&path, &self.material(name))
    }

    /// Writer for `label` in the current session
    pub fn open_session_writer(&self, label: &str) -> Result<LogWriter<File>> {
        self.open_writer(label, &self.session)
    }

    /// Decrypt every readable record of a log
    #[instrument(skip(self))]
    pub fn read(&self, label: &str, name: &str) -> Result<Vec<LogRecord>> {
        let path = self.path(label, name)?;
        let bytes = Zeroizing::new(std::fs::read(&path)?);
        let records = LogReader::new(&self.material(name)).read_records(&bytes);
        debug!(path = %path.display(), records = records.len(), "Read log");
        Ok(records)
    }

    #[instrument(skip(self))]
    pub async fn read_async(&self, label: &str, name: &str) -> Result<Vec<LogRecord>> {
        let path = self.path(label, name)?;
        LogReader::read_file(&self.material(name), &path).await
    }

    /// Labels that have a log directory, sorted
    pub fn labels(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut labels = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                labels.push(name.to_string());
            }
        }
        labels.sort();
        Ok(labels)
    }

    /// Names of the logs stored under `label`, sorted. Empty if the label has none.
    pub fn list(&self, label: &str) -> Result<Vec<String>> {
        check_component(label)?;
        list_log_stems(&self.root.join(label))
    }
}

/// Stems of the `.log` files directly inside `dir`, sorted
pub(crate) fn list_log_stems(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(LOG_EXTENSION) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            names.push(stem.to_string());
        }
    }
    names.sort();
    Ok(names)
}

pub(crate) fn check_component(part: &str) -> Result<()> {
    let mut components = Path::new(part).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(ProtocolError::Custom(format!("Invalid log path component: {part:?}"))),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "devbridge-store-{tag}-{}",
            crate::core::envelope::CorrelationId::random()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_path_layout_and_validation() {
        let store = LogStore::new("/var/logs", "pw", "dev");
        assert_eq!(
            store.path("network", "session1").unwrap(),
            PathBuf::from("/var/logs/network/session1.log")
        );
        assert!(store.path("..", "x").is_err());
        assert!(store.path("a/b", "x").is_err());
        assert!(store.path("a", "").is_err());
    }

    #[test]
    fn test_reopen_continues_keystream() {
        let root = temp_root("reopen");
        let store = LogStore::new(&root, "pw", "dev");

        {
            let mut w = store.open_writer("app", "main").unwrap();
            w.append_record(&LogRecord::new("app", "info", "one")).unwrap();
        }
        {
            let mut w = store.open_writer("app", "main").unwrap();
            w.append_record(&LogRecord::new("app", "info", "two")).unwrap();
        }

        let messages: Vec<String> = store
            .read("app", "main")
            .unwrap()
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert_eq!(messages, ["one", "two"]);
        assert_eq!(store.list("app").unwrap(), ["main"]);
        assert!(store.list("missing").unwrap().is_empty());

        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_session_writer_and_labels() {
        let root = temp_root("session");
        let store = LogStore::new(&root, "pw", "dev");
        assert!(store.session().starts_with("session-"));
        assert!(store.labels().unwrap().is_empty());

        let store = store.with_session("session-0000000000042");
        for label in ["ui", "network"] {
            store
                .open_session_writer(label)
                .unwrap()
                .append_record(&LogRecord::new(label, "info", "hello"))
                .unwrap();
        }
        std::fs::write(root.join("stray.txt"), b"not a label").unwrap();

        assert_eq!(store.labels().unwrap(), ["network", "ui"]);
        assert_eq!(store.list("ui").unwrap(), ["session-0000000000042"]);
        assert_eq!(store.read("ui", store.session()).unwrap()[0].message, "hello");

        std::fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_session_names_sort_by_start() {
        let early = session_name(UNIX_EPOCH + std::time::Duration::from_millis(999));
        let late = session_name(UNIX_EPOCH + std::time::Duration::from_millis(1_700_000_000_000));
        assert_eq!(early, "session-0000000000999");
        assert_eq!(late, "session-1700000000000");
        assert!(early < late);
    }

    #[tokio::test]
    async fn test_async_read_matches_sync() {
        let root = temp_root("async");
        let store = LogStore::new(&root, "pw", "dev");
        let mut w = store.open_writer("net", "trace").unwrap();
        for i in 0..3 {
            w.append_record(&LogRecord::new("net", "debug", format!("r{i}")))
                .unwrap();
        }
        drop(w);

        let sync = store.read("net", "trace").unwrap();
        let async_read = store.read_async("net", "trace").await.unwrap();
        assert_eq!(sync, async_read);
        assert_eq!(sync.len(), 3);

        std::fs::remove_dir_all(root).unwrap();
    }
}
