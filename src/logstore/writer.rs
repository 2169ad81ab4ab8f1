use super::record::LogRecord;
use crate::core::cobs;
use crate::core::codec::split_frames;
use crate::crypto::{KeyMaterial, StreamCipherEngine};
use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;
use zeroize::Zeroize;

/// Appends encrypted, framed records to one stream.
///
/// Each record is encrypted with the stream's single cipher engine and then
/// framed, so the file is `frame(encrypt(r1)) frame(encrypt(r2)) ...` with the
/// keystream running continuously across records.
pub struct LogWriter<W: Write> {
    engine: StreamCipherEngine,
    sink: W,
    records: u64,
}

impl<W: Write> LogWriter<W> {
    /// Writer for a fresh stream, starting at keystream position 0
    pub fn new(sink: W, material: &KeyMaterial) -> Self {
        Self {
            engine: StreamCipherEngine::from_material(material),
            sink,
            records: 0,
        }
    }

    pub fn append(&mut self, plaintext: &[u8]) -> Result<()> {
        let ciphertext = self.engine.encrypt(plaintext);
        let framed = cobs::frame(ciphertext.as_slice());
        self.sink.write_all(&framed)?;
        self.sink.flush()?;
        self.records += 1;
        Ok(())
    }

    pub fn append_record(&mut self, record: &LogRecord) -> Result<()> {
        let mut json = record.to_json()?;
        let result = self.append(&json);
        json.zeroize();
        result
    }

    /// Records appended through this writer
    pub fn records_written(&self) -> u64 {
        self.records
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn skip_keystream(&mut self, mut count: usize) {
        let mut scratch = [0u8; 4096];
        while count > 0 {
            let n = count.min(scratch.len());
            self.engine.apply_keystream(&mut scratch[..n]);
            count -= n;
        }
        scratch.zeroize();
    }
}

impl LogWriter<File> {
    /// Open `path` for appending, creating it if needed.
    ///
    /// The keystream is advanced past the records already in the file, counting
    /// only frames a reader would be able to decode.
    pub fn open(path: impl AsRef<Path>, material: &KeyMaterial) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let mut existing = Vec::new();
        file.read_to_end(&mut existing)?;

        let consumed: usize = split_frames(&existing)
            .filter_map(|frame| cobs::decode(frame).ok())
            .map(|payload| payload.len())
            .sum();

        // A torn final frame must not swallow the next record
        if existing.last().is_some_and(|&b| b != cobs::DELIMITER) {
            file.write_all(&[cobs::DELIMITER])?;
        }
        existing.zeroize();

        let mut writer = Self::new(file, material);
        writer.skip_keystream(consumed);
        debug!(path = %path.display(), consumed, "Opened log for append");
        Ok(writer)
    }
}
