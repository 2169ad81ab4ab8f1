use super::record::LogRecord;
use crate::core::buffer::SecureBuffer;
use crate::core::cobs;
use crate::core::codec::{split_frames, FrameCodec};
use crate::crypto::{KeyMaterial, StreamCipherEngine};
use crate::error::Result;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio_util::codec::FramedRead;
use tracing::{debug, instrument, warn};

/// Decrypts one log stream in file order.
///
/// Decryption has to replay the keystream from the start of the stream, so a
/// reader is used for exactly one pass over one file. Frames that fail to
/// unstuff are skipped without consuming keystream; records that decrypt to
/// invalid UTF-8 or invalid JSON are skipped individually.
pub struct LogReader {
    engine: StreamCipherEngine,
}

impl LogReader {
    pub fn new(material: &KeyMaterial) -> Self {
        Self {
            engine: StreamCipherEngine::from_material(material),
        }
    }

    /// Unstuff and decrypt the next frame of the stream
    pub fn decrypt_frame(&mut self, stuffed: &[u8]) -> Result<SecureBuffer> {
        let ciphertext = SecureBuffer::from_vec(cobs::decode(stuffed)?);
        Ok(self.engine.decrypt(ciphertext.as_slice()))
    }

    /// Every decodable payload in `bytes`, in order
    pub fn read_payloads(&mut self, bytes: &[u8]) -> Vec<SecureBuffer> {
        split_frames(bytes)
            .filter_map(|frame| self.next_payload(frame))
            .collect()
    }

    pub fn read_records(&mut self, bytes: &[u8]) -> Vec<LogRecord> {
        self.read_json(bytes)
    }

    /// Every frame of `bytes` that decrypts to a JSON `T`, in order
    pub fn read_json<T: DeserializeOwned>(&mut self, bytes: &[u8]) -> Vec<T> {
        split_frames(bytes)
            .filter_map(|frame| self.next_json(frame))
            .collect()
    }

    /// Read and decrypt a whole log file.
    ///
    /// Frames are not size-limited here: anything the writer accepted is read
    /// back, so this returns the same records as [`read_records`](Self::read_records)
    /// over the file's bytes.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn read_file(material: &KeyMaterial, path: &Path) -> Result<Vec<LogRecord>> {
        let file = tokio::fs::File::open(path).await?;
        let mut frames = FramedRead::new(file, FrameCodec::unbounded());
        let mut reader = Self::new(material);
        let mut records = Vec::new();

        while let Some(frame) = frames.next().await {
            records.extend(reader.next_json(&frame?));
        }

        debug!(records = records.len(), "Read log");
        Ok(records)
    }

    fn next_payload(&mut self, stuffed: &[u8]) -> Option<SecureBuffer> {
        match self.decrypt_frame(stuffed) {
            Ok(payload) => Some(payload),
            Err(e) => {
                warn!(len = stuffed.len(), error = %e, "Skipping corrupt log frame");
                None
            }
        }
    }

    fn next_json<T: DeserializeOwned>(&mut self, stuffed: &[u8]) -> Option<T> {
        let payload = self.next_payload(stuffed)?;
        match serde_json::from_slice(payload.as_slice()) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable log record");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::crypto::derive_key;
    use crate::logstore::writer::LogWriter;

    #[test]
    fn test_reads_back_known_scenario() {
        let material = derive_key("session1", "pw", "dev");
        let mut reader = LogReader::new(&material);
        let payloads = reader.read_payloads(&hex::decode("0305e600").unwrap());
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0].as_slice(), b"Hi");
    }

    #[test]
    fn test_records_in_order() {
        let material = derive_key("app", "secret", "device-1");
        let mut writer = LogWriter::new(Vec::new(), &material);
        for i in 0..5 {
            writer
                .append_record(&LogRecord::new("app", "info", format!("line {i}")))
                .unwrap();
        }
        let bytes = writer.into_inner();

        let records = LogReader::new(&material).read_records(&bytes);
        let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, ["line 0", "line 1", "line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_wrong_key_yields_nothing() {
        let mut writer = LogWriter::new(Vec::new(), &derive_key("a", "right", "d"));
        writer
            .append_record(&LogRecord::new("a", "info", "secret"))
            .unwrap();
        let bytes = writer.into_inner();
        let records = LogReader::new(&derive_key("a", "wrong", "d")).read_records(&bytes);
        assert!(records.is_empty());
    }

    #[test]
    fn test_unreadable_frame_skipped() {
        let material = derive_key("x", "y", "z");
        // Truncated run: unstuffs to an empty payload, which is not a record
        let mut bytes = vec![0x00, 0x07, 0x00];
        let mut writer = LogWriter::new(Vec::new(), &material);
        writer
            .append_record(&LogRecord::new("x", "info", "first"))
            .unwrap();
        bytes.extend(writer.into_inner());

        let records = LogReader::new(&material).read_records(&bytes);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "first");
    }
}
