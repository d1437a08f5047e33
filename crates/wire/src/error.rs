// SPDX-License-Identifier: MIT

//! Wire-level errors: malformed envelopes and chunk reassembly faults.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("chunk set incomplete: have {have} of {total}")]
    IncompleteChunks { have: u32, total: u32 },

    #[error("chunk at index {index} is missing")]
    MissingChunk { index: u32 },

    #[error("chunks from more than one chunk_id were mixed together")]
    MixedChunkIds,

    #[error("reassembled payload digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("failed to decode envelope: {0}")]
    Decode(String),
}
