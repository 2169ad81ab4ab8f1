use crate::core::envelope::CorrelationId;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, 0 if the clock is before it
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// One stored log line. Serialised as JSON inside each encrypted frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: String,
    /// Milliseconds since the Unix epoch
    pub time: u64,
    pub label: String,
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub line: Option<u32>,
}

impl LogRecord {
    pub fn new(label: impl Into<String>, level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: CorrelationId::random().to_string(),
            time: now_millis(),
            label: label.into(),
            level: level.into(),
            message: message.into(),
            fields: BTreeMap::new(),
            file: None,
            line: None,
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn with_location(mut self, file: Option<&str>, line: Option<u32>) -> Self {
        self.file = file.map(str::to_string);
        self.line = line;
        self
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_json_shape() {
        let record = LogRecord::new("app", "info", "started")
            .with_field("port", "8080")
            .with_location(Some("main.rs"), Some(12));
        let json: serde_json::Value = serde_json::from_slice(&record.to_json().unwrap()).unwrap();
        assert_eq!(json["label"], "app");
        assert_eq!(json["message"], "started");
        assert_eq!(json["fields"]["port"], "8080");
        assert_eq!(json["line"], 12);
        assert_eq!(LogRecord::from_json(&record.to_json().unwrap()).unwrap(), record);
    }

    #[test]
    fn test_missing_optional_fields() {
        let json = br#"{"id":"x","time":1,"label":"l","level":"warn","message":"m"}"#;
        let record = LogRecord::from_json(json).unwrap();
        assert!(record.fields.is_empty());
        assert_eq!(record.file, None);
    }
}
