//! # Configuration Management
//!
//! Centralized configuration for the bridge.
//!
//! This module provides structured configuration for the protocol engine, the
//! stream transport, the encrypted log store and diagnostic logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Direct instantiation with defaults
//! - Environment overrides via `from_env()` (`DEVBRIDGE_*`)
//!
//! ## Defaults
//! - Responses are awaited for 30 seconds
//! - The companion's connect request is awaited for 2 seconds
//! - Partial frames above 16 MB are discarded

use crate::error::{ProtocolError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

/// Max size of a single stuffed frame or of a partial frame held in reassembly
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default wait for a correlated response
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait for the connect acknowledgement
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Default companion endpoint for the TCP transport
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:13228";

/// Default socket read size
pub const DEFAULT_READ_BUFFER_SIZE: usize = 6500;

/// Device identifier used when the platform does not provide one
pub const DEFAULT_DEVICE_ID: &str = "None";

/// Every section of the bridge configuration. Missing sections take their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub protocol: ProtocolConfig,
    pub transport: TransportConfig,
    pub log_store: LogStoreConfig,
    pub logging: LoggingConfig,
}

fn config_error(context: &str, err: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::ConfigError(format!("{context}: {err}"))
}

fn env_millis(var: &str) -> Result<Option<Duration>> {
    match std::env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|e| config_error(&format!("Invalid {var}"), e)),
        Err(_) => Ok(None),
    }
}

impl BridgeConfig {
    /// Read and parse a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| config_error(&format!("Cannot read {}", path.display()), e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| config_error("Invalid TOML", e))
    }

    /// Defaults, overridden by `DEVBRIDGE_ADDRESS`, `DEVBRIDGE_RESPONSE_TIMEOUT_MS`,
    /// `DEVBRIDGE_HANDSHAKE_TIMEOUT_MS`, `DEVBRIDGE_LOG_DIR` and `DEVBRIDGE_DEVICE_ID`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(address) = std::env::var("DEVBRIDGE_ADDRESS") {
            config.transport.address = address;
        }
        if let Some(timeout) = env_millis("DEVBRIDGE_RESPONSE_TIMEOUT_MS")? {
            config.protocol.response_timeout = timeout;
        }
        if let Some(timeout) = env_millis("DEVBRIDGE_HANDSHAKE_TIMEOUT_MS")? {
            config.protocol.handshake_timeout = timeout;
        }
        if let Some(dir) = std::env::var_os("DEVBRIDGE_LOG_DIR") {
            config.log_store.directory = PathBuf::from(dir);
        }
        if let Ok(device_id) = std::env::var("DEVBRIDGE_DEVICE_ID") {
            config.log_store.device_id = device_id;
        }

        Ok(config)
    }

    pub fn default_with_overrides(mutate: impl FnOnce(&mut Self)) -> Self {
        let mut config = Self::default();
        mutate(&mut config);
        config
    }

    /// The default configuration rendered as TOML
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = toml::to_string_pretty(self).map_err(|e| config_error("Cannot encode config", e))?;
        std::fs::write(path, text)
            .map_err(|e| config_error(&format!("Cannot write {}", path.display()), e))
    }

    /// Every problem found across all sections; empty when the configuration is usable
    pub fn validate(&self) -> Vec<String> {
        self.protocol
            .validate()
            .into_iter()
            .chain(self.transport.validate())
            .chain(self.log_store.validate())
            .chain(self.logging.validate())
            .collect()
    }

    /// [`validate`](Self::validate) folded into a single `ConfigError`
    pub fn validate_strict(&self) -> Result<()> {
        let problems = self.validate();
        if problems.is_empty() {
            return Ok(());
        }
        Err(ProtocolError::ConfigError(format!(
            "{} configuration problem(s): {}",
            problems.len(),
            problems.join("; ")
        )))
    }
}

/// Protocol engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProtocolConfig {
    /// Wait for a correlated response before failing with a timeout
    #[serde(with = "millis")]
    pub response_timeout: Duration,

    /// Wait for the connect acknowledgement when initiating a connection
    #[serde(with = "millis")]
    pub handshake_timeout: Duration,

    /// Largest partial frame kept in the reassembly buffer
    pub max_frame_size: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

impl ProtocolConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.response_timeout.as_millis() < 10 {
            errors.push("Response timeout too short (minimum: 10ms)".to_string());
        } else if self.response_timeout.as_secs() > 600 {
            errors.push("Response timeout too long (maximum: 600s)".to_string());
        }

        if self.handshake_timeout.as_millis() < 10 {
            errors.push("Handshake timeout too short (minimum: 10ms)".to_string());
        }

        if self.max_frame_size < 1024 {
            errors.push("Max frame size too small (minimum: 1 KB)".to_string());
        } else if self.max_frame_size > 256 * 1024 * 1024 {
            errors.push(format!(
                "Max frame size too large: {} bytes (maximum: 256 MB)",
                self.max_frame_size
            ));
        }

        errors
    }
}

/// Stream transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Companion address for the TCP transport (e.g., "127.0.0.1:13228")
    pub address: String,

    /// Bytes requested per socket read
    pub read_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            address: String::from(DEFAULT_ADDRESS),
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
        }
    }
}

impl TransportConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Transport address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid transport address format: '{}' (expected format: '127.0.0.1:13228')",
                self.address
            ));
        }

        if self.read_buffer_size == 0 {
            errors.push("Read buffer size must be greater than 0".to_string());
        }

        errors
    }
}

/// Encrypted log store configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogStoreConfig {
    /// Root directory; logs live at `<directory>/<label>/<name>.log`
    pub directory: PathBuf,

    /// Device identifier mixed into key derivation
    pub device_id: String,

    /// Forward every new record to the companion while connected
    #[serde(default)]
    pub live_log: bool,

    /// Network traces live at `<trace_directory>/<session>.log`
    #[serde(default = "default_trace_directory")]
    pub trace_directory: PathBuf,

    /// Forward every new network trace record while connected
    #[serde(default)]
    pub live_trace: bool,
}

fn default_trace_directory() -> PathBuf {
    std::env::temp_dir().join("devbridge-traces")
}

impl Default for LogStoreConfig {
    fn default() -> Self {
        Self {
            directory: std::env::temp_dir().join("devbridge-logs"),
            device_id: String::from(DEFAULT_DEVICE_ID),
            live_log: false,
            trace_directory: default_trace_directory(),
            live_trace: false,
        }
    }
}

impl LogStoreConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.directory.as_os_str().is_empty() {
            errors.push("Log directory cannot be empty".to_string());
        }

        if self.trace_directory.as_os_str().is_empty() {
            errors.push("Trace directory cannot be empty".to_string());
        } else if self.trace_directory == self.directory {
            errors.push("Trace directory must differ from the log directory".to_string());
        }

        if self.device_id.is_empty() {
            errors.push("Device id cannot be empty".to_string());
        }

        errors
    }
}

/// Diagnostic output of the bridge itself
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Name attached to every emitted line
    pub app_name: String,

    /// Lowest level emitted unless `RUST_LOG` says otherwise
    #[serde(with = "level_name")]
    pub log_level: Level,

    /// Emit to stderr at all
    pub log_to_console: bool,

    /// One JSON object per line instead of human-readable text
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("devbridge"),
            log_level: Level::INFO,
            log_to_console: true,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    const MAX_APP_NAME: usize = 64;

    pub fn validate(&self) -> Vec<String> {
        match self.app_name.len() {
            0 => vec!["Application name cannot be empty".to_string()],
            n if n > Self::MAX_APP_NAME => vec![format!(
                "Application name too long: {n} characters (maximum: {})",
                Self::MAX_APP_NAME
            )],
            _ => Vec::new(),
        }
    }
}

/// Durations as whole milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `tracing::Level` as a lowercase name
mod level_name {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub fn serialize<S: Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Level, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse::<Level>()
            .map_err(|_| D::Error::custom(format!("unknown log level {name:?}")))
    }
}
