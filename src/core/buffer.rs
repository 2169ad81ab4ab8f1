//! # Secure Byte Buffer
//!
//! Owned byte container that zeroes its contents when it is erased or dropped.
//!
//! Every buffer that carries key material, plaintext records or wire bytes goes
//! through [`SecureBuffer`]. Contents are never truncated implicitly; the only
//! way to shrink a buffer is [`SecureBuffer::trim`] (which zeroes the dropped
//! tail) or [`SecureBuffer::erase`].
//!
//! ## Usage
//! ```rust
//! use devbridge::core::buffer::SecureBuffer;
//!
//! let mut buf = SecureBuffer::from_hex("48656c6c6f").unwrap();
//! buf.append(&SecureBuffer::from_utf8(", world"));
//! assert_eq!(buf.to_utf8().unwrap(), "Hello, world");
//! assert_eq!(buf.prefix(5).to_hex(), "48656c6c6f");
//! ```

use crate::error::{constants, ProtocolError, Result};
use base64::Engine as _;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use zeroize::{Zeroize, Zeroizing};

/// Byte buffer that overwrites its contents with zeros on erase and on drop
#[derive(Clone, Default, Zeroize)]
#[zeroize(drop)]
pub struct SecureBuffer {
    bytes: Vec<u8>,
}

impl SecureBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Create an empty buffer with reserved capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
        }
    }

    /// Create a zero-filled buffer of `count` bytes
    pub fn zeroed(count: usize) -> Self {
        Self {
            bytes: vec![0u8; count],
        }
    }

    /// Copy raw bytes into a new buffer
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
        }
    }

    /// Take ownership of an existing vector
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Copy the UTF-8 encoding of `text`
    pub fn from_utf8(text: &str) -> Self {
        Self::from_slice(text.as_bytes())
    }

    /// Parse a hex string (either case, even length, no separators)
    pub fn from_hex(text: &str) -> Result<Self> {
        hex::decode(text)
            .map(Self::from_vec)
            .map_err(|e| ProtocolError::InvalidEncoding(format!("{}: {e}", constants::ERR_INVALID_HEX)))
    }

    /// Parse standard padded base64
    pub fn from_base64(text: &str) -> Result<Self> {
        base64::engine::general_purpose::STANDARD
            .decode(text)
            .map(Self::from_vec)
            .map_err(|e| {
                ProtocolError::InvalidEncoding(format!("{}: {e}", constants::ERR_INVALID_BASE64))
            })
    }

    /// Concatenate several buffers into a new one
    pub fn concat(parts: &[&SecureBuffer]) -> Self {
        let total = parts.iter().map(|p| p.len()).sum();
        let mut out = Self::with_capacity(total);
        for part in parts {
            out.bytes.extend_from_slice(&part.bytes);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Append a single byte
    pub fn push(&mut self, byte: u8) {
        self.reserve_secure(1);
        self.bytes.push(byte);
    }

    /// Append raw bytes
    pub fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.reserve_secure(bytes.len());
        self.bytes.extend_from_slice(bytes);
    }

    /// Append the contents of another buffer
    pub fn append(&mut self, other: &SecureBuffer) {
        self.extend_from_slice(&other.bytes);
    }

    /// First `max_len` bytes (or the whole buffer if shorter)
    pub fn prefix(&self, max_len: usize) -> Self {
        let end = max_len.min(self.bytes.len());
        Self::from_slice(&self.bytes[..end])
    }

    /// Bytes from `start` to the end (empty if `start` is past the end)
    pub fn suffix(&self, start: usize) -> Self {
        let start = start.min(self.bytes.len());
        Self::from_slice(&self.bytes[start..])
    }

    /// Shrink to `count` bytes, zeroing the dropped tail. No-op if already shorter.
    pub fn trim(&mut self, count: usize) {
        if count >= self.bytes.len() {
            return;
        }
        self.bytes[count..].zeroize();
        self.bytes.truncate(count);
    }

    /// Whether every byte equals `value` (true for an empty buffer)
    pub fn contains_only(&self, value: u8) -> bool {
        self.bytes.iter().all(|&b| b == value)
    }

    /// Overwrite every byte with zero and empty the buffer
    pub fn erase(&mut self) {
        self.bytes.zeroize();
    }

    /// Run `f` over a transient copy of the contents; the copy is zeroed before returning
    pub fn with_exposed<T>(&self, f: impl FnOnce(&[u8]) -> T) -> T {
        let copy = Zeroizing::new(self.bytes.clone());
        f(&copy)
    }

    /// Copy out the contents; the caller owns zeroing the returned vector
    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// Standard padded base64 rendering
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Interpret the contents as UTF-8 text
    pub fn to_utf8(&self) -> Result<String> {
        std::str::from_utf8(&self.bytes)
            .map(str::to_owned)
            .map_err(|e| ProtocolError::InvalidEncoding(format!("{}: {e}", constants::ERR_INVALID_UTF8)))
    }

    /// Sequential reader over the contents
    pub fn reader(&self) -> ByteReader<'_> {
        ByteReader::new(&self.bytes)
    }

    /// Grow through a fresh allocation so a reallocation never leaves a stale copy behind
    fn reserve_secure(&mut self, additional: usize) {
        let needed = self.bytes.len() + additional;
        if needed <= self.bytes.capacity() {
            return;
        }
        let mut grown = Vec::with_capacity(needed.max(self.bytes.capacity() * 2));
        grown.extend_from_slice(&self.bytes);
        self.bytes.zeroize();
        self.bytes = grown;
    }
}

impl PartialEq for SecureBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for SecureBuffer {}

impl Hash for SecureBuffer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.hash(state);
    }
}

impl fmt::Debug for SecureBuffer {
    // Contents may be key material; only the length is printed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureBuffer")
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl From<&[u8]> for SecureBuffer {
    fn from(bytes: &[u8]) -> Self {
        Self::from_slice(bytes)
    }
}

impl From<Vec<u8>> for SecureBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}

impl AsRef<[u8]> for SecureBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl io::Write for SecureBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Cursor over a byte slice with checked fixed-width reads.
///
/// Integers are read little-endian. A short read returns an error and leaves
/// the cursor where it was.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.remaining() > 0
    }

    /// Read exactly `count` bytes
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(ProtocolError::InvalidEncoding(
                constants::ERR_SHORT_READ.to_string(),
            ));
        }
        let out = &self.bytes[self.position..self.position + count];
        self.position += count;
        Ok(out)
    }

    /// Advance past `count` bytes, returning how many were actually skipped
    pub fn skip(&mut self, count: usize) -> usize {
        let skipped = count.min(self.remaining());
        self.position += skipped;
        skipped
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.read_array().map(i64::from_le_bytes)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Write;

    #[test]
    fn test_construction_forms_agree() {
        let raw = SecureBuffer::from_slice(b"Hi");
        let hex = SecureBuffer::from_hex("4869").unwrap();
        let upper = SecureBuffer::from_hex("4869".to_uppercase().as_str()).unwrap();
        let b64 = SecureBuffer::from_base64("SGk=").unwrap();
        assert_eq!(raw, hex);
        assert_eq!(raw, upper);
        assert_eq!(raw, b64);
        assert_eq!(raw.to_base64(), "SGk=");
        assert_eq!(SecureBuffer::zeroed(4).as_slice(), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_invalid_hex_rejected() {
        assert!(matches!(
            SecureBuffer::from_hex("abc"),
            Err(ProtocolError::InvalidEncoding(_))
        ));
        assert!(SecureBuffer::from_hex("zz").is_err());
        assert!(SecureBuffer::from_base64("!!!").is_err());
    }

    #[test]
    fn test_prefix_suffix_clamp() {
        let buf = SecureBuffer::from_slice(&[1, 2, 3, 4, 5]);
        assert_eq!(buf.prefix(2).as_slice(), &[1, 2]);
        assert_eq!(buf.prefix(99).as_slice(), &[1, 2, 3, 4, 5]);
        assert_eq!(buf.suffix(3).as_slice(), &[4, 5]);
        assert!(buf.suffix(9).is_empty());
    }

    #[test]
    fn test_concat_and_append() {
        let a = SecureBuffer::from_slice(&[1]);
        let b = SecureBuffer::from_slice(&[2, 3]);
        let joined = SecureBuffer::concat(&[&a, &b, &a]);
        assert_eq!(joined.as_slice(), &[1, 2, 3, 1]);

        let mut grown = SecureBuffer::new();
        for i in 0..100u8 {
            grown.push(i);
        }
        grown.append(&b);
        assert_eq!(grown.len(), 102);
        assert_eq!(grown.as_slice()[99], 99);
    }

    #[test]
    fn test_erase_and_trim() {
        let mut buf = SecureBuffer::from_slice(&[9; 16]);
        buf.trim(4);
        assert_eq!(buf.as_slice(), &[9, 9, 9, 9]);
        buf.trim(10);
        assert_eq!(buf.len(), 4);
        buf.erase();
        assert!(buf.is_empty());
        assert!(buf.contains_only(0));
    }

    #[test]
    fn test_equality_and_hash() {
        let mut set = HashSet::new();
        set.insert(SecureBuffer::from_slice(b"key"));
        assert!(set.contains(&SecureBuffer::from_utf8("key")));
        assert!(!set.contains(&SecureBuffer::from_utf8("kez")));
    }

    #[test]
    fn test_debug_does_not_leak() {
        let buf = SecureBuffer::from_utf8("secret");
        let rendered = format!("{buf:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("len: 6"));
    }

    #[test]
    fn test_with_exposed_sees_contents() {
        let buf = SecureBuffer::from_slice(&[1, 2, 3]);
        let sum: u32 = buf.with_exposed(|bytes| bytes.iter().map(|&b| b as u32).sum());
        assert_eq!(sum, 6);
    }

    #[test]
    fn test_reader_fixed_width() {
        let mut buf = SecureBuffer::new();
        buf.write_all(&0xBEEFu16.to_le_bytes()).unwrap();
        buf.write_all(&7u32.to_le_bytes()).unwrap();
        buf.write_all(&[0xAA]).unwrap();

        let mut reader = buf.reader();
        assert_eq!(reader.read_u16().unwrap(), 0xBEEF);
        assert_eq!(reader.read_u32().unwrap(), 7);
        assert_eq!(reader.remaining(), 1);
        assert!(reader.read_u32().is_err());
        assert_eq!(reader.position(), 6);
        assert_eq!(reader.read_u8().unwrap(), 0xAA);
        assert!(!reader.has_remaining());
        assert_eq!(reader.skip(3), 0);
    }
}
