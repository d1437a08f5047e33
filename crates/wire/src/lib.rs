// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobmesh-wire: the message envelope and payload types that cross the
//! WebSocket boundary, plus the chunked-transport codec for payloads
//! too large for a single frame. This crate knows nothing about
//! sockets or connection bookkeeping — it's pure encode/decode.

pub mod chunk;
pub mod envelope;
pub mod error;
pub mod payload;

pub use chunk::{reassemble, sha256_hex, split, Chunk, ChunkInfo};
pub use envelope::Envelope;
pub use error::WireError;
pub use payload::Payload;
