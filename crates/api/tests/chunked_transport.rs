// SPDX-License-Identifier: MIT

//! End-to-end chunked-transport scenario: an oversized message sent to
//! a monitor is delivered as a run of chunk fragments and reconstructed
//! into exactly one message equal to the original, digest and all.

use jobmesh_api::cm::{ConnectionManager, ReassemblyBuffer, CHUNK_SIZE_BYTES, CHUNK_THRESHOLD_BYTES};
use jobmesh_core::ConnectionKind;
use jobmesh_wire::Payload;

fn oversized_snapshot(approx_bytes: usize) -> Payload {
    let mut jobs = Vec::new();
    let mut encoded_len = 0;
    while encoded_len < approx_bytes {
        let job = serde_json::json!({
            "job_id": format!("job-{}", jobs.len()),
            "service_required": "comfyui",
            "payload": "x".repeat(64),
        });
        encoded_len += serde_json::to_string(&job).map(|s| s.len()).unwrap_or(0);
        jobs.push(job);
    }
    Payload::FullStateSnapshot { jobs, workers: Vec::new(), machines: Vec::new() }
}

#[tokio::test]
async fn oversized_message_reconstructs_to_exactly_one_message_with_matching_hash() {
    let cm = ConnectionManager::new();
    let (conn, mut rx) = cm.register(ConnectionKind::Monitor, "mon-scenario-5", 0).await;

    let original = oversized_snapshot(4 * CHUNK_SIZE_BYTES);
    let encoded_size = serde_json::to_vec(&original).map(|v| v.len()).unwrap_or(0);
    assert!(encoded_size > CHUNK_THRESHOLD_BYTES, "fixture must exceed the chunking threshold");

    assert!(cm.send_to(ConnectionKind::Monitor, "mon-scenario-5", original.clone(), 1).await);

    let buffer = ReassemblyBuffer::new(60_000);
    let mut fragments_seen = 0;
    let mut reconstructed = None;
    while reconstructed.is_none() {
        let envelope = conn.next_outbound(&mut rx).await.expect("fragments must keep arriving");
        assert!(matches!(envelope.payload, Payload::ChunkFragment { .. }), "every interim frame is a fragment");
        fragments_seen += 1;
        reconstructed = buffer.accept(envelope, 1);
    }

    assert!(fragments_seen >= 4, "a 4x-chunk-size payload should split into at least 4 fragments");
    let reconstructed = reconstructed.expect("reassembly succeeds once every fragment has arrived");
    assert_eq!(reconstructed.payload, original, "reconstructed payload equals the original");

    // no further frame is waiting: exactly one logical message was delivered
    assert!(
        tokio::time::timeout(std::time::Duration::from_millis(50), conn.next_outbound(&mut rx)).await.is_err(),
        "no extra message should follow the reassembled one"
    );
}

#[tokio::test]
async fn a_corrupted_fragment_fails_the_digest_check_instead_of_reconstructing_garbage() {
    let buffer = ReassemblyBuffer::new(60_000);
    let payload = b"a payload long enough to span more than one chunk boundary".to_vec();
    let mut chunks = jobmesh_wire::split("chk-corrupt", &payload, 8);
    assert!(chunks.len() > 1);
    chunks[0].data[0] ^= 0xFF;

    for chunk in chunks {
        let data = jobmesh_wire::chunk::encode_fragment(&chunk.data);
        let mut envelope = jobmesh_wire::Envelope::new(Payload::ChunkFragment { data }, 1);
        envelope.chunk_info = Some(chunk.info);
        assert!(buffer.accept(envelope, 1).is_none(), "a tampered fragment set must not reassemble");
    }
}
