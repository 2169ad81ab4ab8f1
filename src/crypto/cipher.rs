//! Stream cipher engine: ChaCha20 keystream XOR with an explicit block cursor.
//!
//! The engine keeps the current 64-byte keystream block and the offset into it, so
//! a stream may be encrypted in pieces of any size and still line up byte for byte
//! with a single-shot encryption. The block counter is 32-bit little-endian and
//! starts at 0; the first keystream block is computed lazily on first use.
//!
//! Not authenticated. Decrypting requires replaying the same key and nonce from
//! counter 0 over the bytes in their original order. One engine serves exactly one
//! stream (one log file, one connection) and must be driven by one caller at a time.

use super::kdf::{KeyMaterial, KEY_LEN, NONCE_LEN};
use crate::core::buffer::SecureBuffer;
use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::{ChaCha20, Key, Nonce};
use zeroize::Zeroize;

/// Keystream block size in bytes
pub const BLOCK_SIZE: usize = 64;

#[derive(Zeroize)]
#[zeroize(drop)]
pub struct StreamCipherEngine {
    key: SecureBuffer,
    nonce: SecureBuffer,
    counter: u32,
    block: [u8; BLOCK_SIZE],
    offset: usize,
    #[zeroize(skip)]
    erased: bool,
}

impl StreamCipherEngine {
    /// Create an engine positioned at block counter 0.
    ///
    /// # Panics
    /// Panics if `key` is not 32 bytes or `nonce` is not 12 bytes.
    pub fn new(key: &[u8], nonce: &[u8]) -> Self {
        assert_eq!(key.len(), KEY_LEN, "stream cipher expects a 32-byte key");
        assert_eq!(nonce.len(), NONCE_LEN, "stream cipher expects a 12-byte nonce");
        Self {
            key: SecureBuffer::from_slice(key),
            nonce: SecureBuffer::from_slice(nonce),
            counter: 0,
            block: [0u8; BLOCK_SIZE],
            offset: BLOCK_SIZE,
            erased: false,
        }
    }

    /// Create an engine from derived key material
    pub fn from_material(material: &KeyMaterial) -> Self {
        Self::new(material.key(), material.nonce())
    }

    /// XOR `buf` in place with the next `buf.len()` keystream bytes.
    ///
    /// # Panics
    /// Panics if the engine has been erased.
    pub fn apply_keystream(&mut self, buf: &mut [u8]) {
        assert!(!self.erased, "stream cipher used after erase");
        if buf.is_empty() {
            return;
        }

        let Self {
            key,
            nonce,
            counter,
            block,
            offset,
            ..
        } = self;

        key.with_exposed(|key| {
            nonce.with_exposed(|nonce| {
                let mut transform: Option<ChaCha20> = None;
                for byte in buf.iter_mut() {
                    if *offset == BLOCK_SIZE {
                        let cipher = transform.get_or_insert_with(|| {
                            ChaCha20::new(Key::from_slice(key), Nonce::from_slice(nonce))
                        });
                        cipher.seek(u64::from(*counter) * BLOCK_SIZE as u64);
                        block.fill(0);
                        cipher.apply_keystream(block);
                        *counter = counter.wrapping_add(1);
                        *offset = 0;
                    }
                    *byte ^= block[*offset];
                    *offset += 1;
                }
            })
        });
    }

    /// Encrypt `data`, advancing the keystream
    pub fn encrypt(&mut self, data: &[u8]) -> SecureBuffer {
        let mut out = SecureBuffer::from_slice(data);
        self.apply_keystream(out.as_mut_slice());
        out
    }

    /// Decrypt `data`; identical to [`encrypt`](Self::encrypt)
    pub fn decrypt(&mut self, data: &[u8]) -> SecureBuffer {
        self.encrypt(data)
    }

    /// Number of keystream blocks generated so far
    pub fn block_counter(&self) -> u32 {
        self.counter
    }

    /// Zero key, nonce and the current block. The engine cannot be used afterwards.
    pub fn erase(&mut self) {
        self.key.erase();
        self.nonce.erase();
        self.block.zeroize();
        self.counter = 0;
        self.offset = BLOCK_SIZE;
        self.erased = true;
    }

    pub fn is_erased(&self) -> bool {
        self.erased
    }
}

impl std::fmt::Debug for StreamCipherEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamCipherEngine")
            .field("counter", &self.counter)
            .field("offset", &self.offset)
            .field("erased", &self.erased)
            .finish_non_exhaustive()
    }
}
