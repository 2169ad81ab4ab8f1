//! Stream framing on top of the byte-stuffing codec.
//!
//! [`FrameAssembler`] is the push-style reassembler used by the protocol engine:
//! chunks arrive with arbitrary boundaries and complete stuffed frames come out.
//! [`FrameCodec`] is the same framing as a tokio-util codec, used where a whole
//! `AsyncRead` is consumed (reading log files).

use super::cobs;
use crate::config::MAX_FRAME_SIZE;
use crate::error::{ProtocolError, Result};
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

/// Accumulates inbound chunks and splits them on the frame delimiter.
///
/// A chunk that ends exactly on a delimiter completes every frame it contains and
/// leaves nothing behind. Otherwise the trailing segment is carried into the next
/// chunk. Empty segments (back-to-back delimiters) are skipped.
#[derive(Debug)]
pub struct FrameAssembler {
    carry: BytesMut,
    max_frame_size: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            carry: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Feed one chunk, returning the stuffed frames it completed (delimiters removed)
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        let mut frames = Vec::new();
        if chunk.is_empty() {
            return frames;
        }

        // Bytes already in the carry were scanned on an earlier push.
        let mut scan_from = self.carry.len();
        self.carry.extend_from_slice(chunk);

        while let Some(offset) = self.carry[scan_from..]
            .iter()
            .position(|&b| b == cobs::DELIMITER)
        {
            let end = scan_from + offset;
            let mut segment = self.carry.split_to(end + 1);
            segment.truncate(end);
            if !segment.is_empty() {
                frames.push(segment.freeze());
            }
            scan_from = 0;
        }

        if self.carry.len() > self.max_frame_size {
            warn!(
                carried = self.carry.len(),
                limit = self.max_frame_size,
                "Discarding oversized partial frame"
            );
            self.carry.clear();
        }

        frames
    }

    /// Bytes waiting for their delimiter
    pub fn pending_len(&self) -> usize {
        self.carry.len()
    }

    /// Drop any partial frame (used when the connection is torn down)
    pub fn reset(&mut self) {
        self.carry.clear();
    }
}

/// tokio-util codec for zero-delimited stuffed frames.
///
/// Decoding yields the stuffed segment without its delimiter; callers unstuff it
/// with [`cobs::decode`] so that a malformed frame can be skipped on its own.
/// Encoding takes an unstuffed payload.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    max_frame_size: usize,
    // Bytes of the buffered partial frame already searched for a delimiter
    scanned: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            max_frame_size,
            scanned: 0,
        }
    }

    /// No size limit, for replaying files whose frames were already accepted on write
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        loop {
            let from = self.scanned.min(src.len());
            match src[from..].iter().position(|&b| b == cobs::DELIMITER) {
                Some(offset) => {
                    let end = from + offset;
                    self.scanned = 0;
                    if end == 0 {
                        src.advance(1);
                        continue;
                    }
                    let mut segment = src.split_to(end + 1);
                    segment.truncate(end);
                    return Ok(Some(segment.freeze()));
                }
                None if src.len() > self.max_frame_size => {
                    self.scanned = 0;
                    return Err(ProtocolError::OversizedFrame(src.len()));
                }
                None => {
                    self.scanned = src.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            // Unterminated tail, e.g. a log file cut short mid-write
            None => Ok(Some(src.split().freeze())),
        }
    }
}

impl Encoder<&[u8]> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        if payload.len() > self.max_frame_size {
            return Err(ProtocolError::OversizedFrame(payload.len()));
        }
        let stuffed = cobs::frame(payload);
        dst.extend_from_slice(&stuffed);
        Ok(())
    }
}

/// Split a complete byte sequence into stuffed frames, including an unterminated tail
pub fn split_frames(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    bytes
        .split(|&b| b == cobs::DELIMITER)
        .filter(|segment| !segment.is_empty())
}
