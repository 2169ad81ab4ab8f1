//! # Frame Codec
//!
//! Consistent-overhead byte stuffing. [`encode`] rewrites an arbitrary byte string
//! so that it contains no zero byte; [`frame`] additionally appends the single zero
//! byte that delimits frames on a stream.
//!
//! ## Wire Format
//! ```text
//! [code][code-1 literal bytes][code][code-1 literal bytes] ... [0x00]
//! ```
//! A code below 0xFF means the run is followed by an implicit zero byte, except
//! after the final run of the frame. A code of 0xFF is a maximal run of 254
//! literals with no implicit zero. A code of 0x00 is malformed.

use crate::error::{ProtocolError, Result};

/// Frame delimiter on the stream
pub const DELIMITER: u8 = 0x00;

/// Code byte marking a full run of 254 literals
const MAX_RUN_CODE: u8 = 0xFF;

/// Worst-case stuffed size for a payload of `len` bytes
#[inline]
pub fn max_encoded_len(len: usize) -> usize {
    len + len / 254 + 1
}

/// Byte-stuff `payload`. The output never contains a zero byte.
pub fn encode(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(max_encoded_len(payload.len()));
    encode_into(payload, &mut out);
    out
}

/// Byte-stuff `payload` and append the frame delimiter
pub fn frame(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(max_encoded_len(payload.len()) + 1);
    encode_into(payload, &mut out);
    out.push(DELIMITER);
    out
}

/// Byte-stuff `payload`, appending to `out`
pub fn encode_into(payload: &[u8], out: &mut Vec<u8>) {
    let mut code_idx = out.len();
    out.push(1);

    for &byte in payload {
        if byte == 0 {
            code_idx = out.len();
            out.push(1);
        } else {
            out[code_idx] += 1;
            out.push(byte);
            if out[code_idx] == MAX_RUN_CODE {
                code_idx = out.len();
                out.push(1);
            }
        }
    }
}

/// Reverse [`encode`]. The input must not include the trailing delimiter.
///
/// # Errors
/// Returns [`ProtocolError::MalformedFrame`] if a code byte is zero.
pub fn decode(stuffed: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(stuffed.len());
    let mut remaining: u8 = 0;
    let mut zero_pending = false;

    for &byte in stuffed {
        if remaining == 0 {
            if zero_pending {
                out.push(0);
            }
            if byte == 0 {
                return Err(ProtocolError::MalformedFrame);
            }
            zero_pending = byte < MAX_RUN_CODE;
            remaining = byte - 1;
        } else {
            out.push(byte);
            remaining -= 1;
        }
    }

    Ok(out)
}
