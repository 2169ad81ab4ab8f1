//! # Log Encryption
//!
//! ChaCha20 keystream engine and the key derivation that feeds it.
//!
//! ## Components
//! - **Cipher**: stateful keystream XOR over arbitrary-length buffers
//! - **KDF**: deterministic (name, passphrase, device id) → (key, nonce) walk
//!
//! ## Security
//! - Key, nonce and keystream state are zeroed on erase and on drop (zeroize crate)
//! - The block transform only ever sees a transient copy of the key and nonce
//! - No authentication: integrity of stored records is not checked

pub mod cipher;
pub mod kdf;

pub use cipher::StreamCipherEngine;
pub use kdf::{derive_key, KeyMaterial};
