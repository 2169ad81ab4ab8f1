//! Key derivation for log encryption.
//!
//! Derives a ChaCha20 key and nonce from a logical name (the log identifier), a
//! passphrase and a device identifier. The routine is a fixed walk over a SHA-512
//! digest; every encrypted log ever written depends on its exact output, so it is
//! an obfuscation step to be kept bit-for-bit stable, not a general-purpose KDF.
//!
//! ```text
//! d      = SHA-512(name ++ passphrase ++ device_id)
//! c      = 42
//! for i in 1..=44:
//!     idx      = d[c % 64]
//!     out[i-1] = d[(c + idx) % 64]
//!     c       += d[(c + idx + i) % 64]
//! nonce  = out at positions {3,7,9,12,14,17,21,24,26,28,33,42}, in order
//! key    = the other 32 positions, in order
//! ```

use sha2::{Digest, Sha512};
use zeroize::{Zeroize, Zeroizing};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

const WALK_LEN: usize = KEY_LEN + NONCE_LEN;
const START_CURSOR: usize = 42;
const NONCE_POSITIONS: [usize; NONCE_LEN] = [3, 7, 9, 12, 14, 17, 21, 24, 26, 28, 33, 42];

/// Derived cipher key and nonce, zeroed on drop
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct KeyMaterial {
    key: [u8; KEY_LEN],
    nonce: [u8; NONCE_LEN],
}

impl KeyMaterial {
    pub fn key(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub fn nonce(&self) -> &[u8; NONCE_LEN] {
        &self.nonce
    }
}

impl PartialEq for KeyMaterial {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.nonce == other.nonce
    }
}

impl Eq for KeyMaterial {}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("KeyMaterial(..)")
    }
}

/// Derive the key and nonce for `name` under `passphrase` on `device_id`
pub fn derive_key(name: &str, passphrase: &str, device_id: &str) -> KeyMaterial {
    let mut hasher = Sha512::new();
    hasher.update(name.as_bytes());
    hasher.update(passphrase.as_bytes());
    hasher.update(device_id.as_bytes());
    let mut digest = Zeroizing::new([0u8; 64]);
    digest.copy_from_slice(&hasher.finalize());

    let walked = walk(&digest);
    split(&walked)
}

fn walk(digest: &[u8; 64]) -> Zeroizing<[u8; WALK_LEN]> {
    let mut out = Zeroizing::new([0u8; WALK_LEN]);
    let mut cursor = START_CURSOR;
    for i in 1..=WALK_LEN {
        let idx = digest[cursor % 64] as usize;
        out[i - 1] = digest[(cursor + idx) % 64];
        cursor += digest[(cursor + idx + i) % 64] as usize;
    }
    out
}

fn split(walked: &[u8; WALK_LEN]) -> KeyMaterial {
    let mut material = KeyMaterial {
        key: [0u8; KEY_LEN],
        nonce: [0u8; NONCE_LEN],
    };
    let (mut k, mut n) = (0, 0);
    for (position, &byte) in walked.iter().enumerate() {
        if NONCE_POSITIONS.contains(&position) {
            material.nonce[n] = byte;
            n += 1;
        } else {
            material.key[k] = byte;
            k += 1;
        }
    }
    material
}
