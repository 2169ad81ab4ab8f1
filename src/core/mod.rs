//! # Core Wire Components
//!
//! Byte containers, frame stuffing and the envelope wire form.
//!
//! ## Components
//! - **Buffer**: zero-on-drop byte container and checked reader
//! - **COBS**: byte-stuffing codec that removes zero bytes from a payload
//! - **Codec**: chunk reassembly and a tokio-util codec for delimited frames
//! - **Envelope**: correlation id plus type-tagged payload
//!
//! ## Wire Format
//! ```text
//! stuffed(bincode(Envelope)) 0x00 stuffed(bincode(Envelope)) 0x00 ...
//! ```
//!
//! ## Security
//! - A partial frame larger than the configured maximum is discarded
//! - Malformed frames are dropped individually; reassembly continues

pub mod buffer;
pub mod cobs;
pub mod codec;
pub mod envelope;
