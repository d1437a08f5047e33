// SPDX-License-Identifier: MIT

//! Chunked transport codec.
//!
//! Large outbound payloads (full state snapshots, oversized job
//! payloads) are split into fixed-size fragments, each carrying the
//! SHA-256 digest of the *whole* reassembled message so the receiver
//! can verify integrity before handing it to the dispatcher. The
//! reassembly buffer itself (the `chunk_id -> received fragments` map)
//! lives in the Connection Manager, not here — this module is pure
//! encode/decode/verify logic with no I/O or expiry policy.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::WireError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkInfo {
    pub chunk_id: String,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub data_hash: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub info: ChunkInfo,
    pub data: Vec<u8>,
}

/// Encode one fragment's raw bytes for transport inside a
/// [`crate::Payload::ChunkFragment`].
pub fn encode_fragment(data: &[u8]) -> String {
    BASE64.encode(data)
}

/// Decode a fragment back into raw bytes.
pub fn decode_fragment(data: &str) -> Result<Vec<u8>, WireError> {
    BASE64.decode(data).map_err(|e| WireError::Decode(e.to_string()))
}

pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Split `data` into chunks of at most `chunk_size` bytes, each tagged
/// with the digest of the full payload and a shared `chunk_id`.
pub fn split(chunk_id: impl Into<String>, data: &[u8], chunk_size: usize) -> Vec<Chunk> {
    debug_assert!(chunk_size > 0);
    let chunk_id = chunk_id.into();
    let hash = sha256_hex(data);
    let total_chunks = data.chunks(chunk_size).count().max(1) as u32;
    if data.is_empty() {
        return vec![Chunk {
            info: ChunkInfo { chunk_id, chunk_index: 0, total_chunks: 1, data_hash: hash },
            data: Vec::new(),
        }];
    }
    data.chunks(chunk_size)
        .enumerate()
        .map(|(index, slice)| Chunk {
            info: ChunkInfo {
                chunk_id: chunk_id.clone(),
                chunk_index: index as u32,
                total_chunks,
                data_hash: hash.clone(),
            },
            data: slice.to_vec(),
        })
        .collect()
}

/// Reassemble chunks (in any order) into the original payload,
/// verifying the digest against the one advertised by the fragments.
pub fn reassemble(mut chunks: Vec<Chunk>) -> Result<Vec<u8>, WireError> {
    if chunks.is_empty() {
        return Err(WireError::IncompleteChunks { have: 0, total: 0 });
    }
    chunks.sort_by_key(|c| c.info.chunk_index);
    let total = chunks[0].info.total_chunks;
    let hash = chunks[0].info.data_hash.clone();
    let chunk_id = chunks[0].info.chunk_id.clone();
    if chunks.len() as u32 != total {
        return Err(WireError::IncompleteChunks { have: chunks.len() as u32, total });
    }
    for (expected_index, chunk) in chunks.iter().enumerate() {
        if chunk.info.chunk_id != chunk_id {
            return Err(WireError::MixedChunkIds);
        }
        if chunk.info.chunk_index != expected_index as u32 {
            return Err(WireError::MissingChunk { index: expected_index as u32 });
        }
    }
    let mut data = Vec::new();
    for chunk in &chunks {
        data.extend_from_slice(&chunk.data);
    }
    let actual_hash = sha256_hex(&data);
    if actual_hash != hash {
        return Err(WireError::DigestMismatch { expected: hash, actual: actual_hash });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_then_reassemble_round_trips_arbitrary_order() {
        let payload: Vec<u8> = (0..5000u32).map(|n| (n % 256) as u8).collect();
        let mut chunks = split("chk-1", &payload, 777);
        assert!(chunks.len() > 1);
        chunks.reverse();
        let rebuilt = reassemble(chunks).expect("reassemble");
        assert_eq!(rebuilt, payload);
    }

    #[test]
    fn empty_payload_round_trips_as_single_chunk() {
        let chunks = split("chk-empty", &[], 100);
        assert_eq!(chunks.len(), 1);
        let rebuilt = reassemble(chunks).expect("reassemble");
        assert!(rebuilt.is_empty());
    }

    #[test]
    fn tampered_data_fails_digest_check() {
        let payload = b"hello chunked world".to_vec();
        let mut chunks = split("chk-2", &payload, 5);
        chunks[0].data[0] ^= 0xFF;
        let err = reassemble(chunks).unwrap_err();
        assert!(matches!(err, WireError::DigestMismatch { .. }));
    }

    #[test]
    fn missing_fragment_is_detected() {
        let payload = b"another payload long enough to split".to_vec();
        let mut chunks = split("chk-3", &payload, 4);
        chunks.remove(1);
        let err = reassemble(chunks).unwrap_err();
        assert!(matches!(err, WireError::IncompleteChunks { .. }));
    }

    #[test]
    fn fragment_encoding_round_trips() {
        let data = b"arbitrary fragment bytes \x00\xff".to_vec();
        let encoded = encode_fragment(&data);
        let decoded = decode_fragment(&encoded).expect("decode");
        assert_eq!(decoded, data);
    }

    #[test]
    fn malformed_fragment_encoding_is_rejected() {
        assert!(decode_fragment("not valid base64!!").is_err());
    }

    #[test]
    fn single_chunk_payload_within_budget_is_identity() {
        let payload = b"small".to_vec();
        let chunks = split("chk-4", &payload, 4096);
        assert_eq!(chunks.len(), 1);
        let rebuilt = reassemble(chunks).expect("reassemble");
        assert_eq!(rebuilt, payload);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn split_reassemble_is_identity_for_any_payload_and_chunk_size(
            payload in proptest::collection::vec(any::<u8>(), 0..8192),
            chunk_size in 1usize..2048,
        ) {
            let chunks = split("chk-prop", &payload, chunk_size);
            let rebuilt = reassemble(chunks).expect("reassemble");
            prop_assert_eq!(rebuilt, payload);
        }
    }
}
