// SPDX-License-Identifier: MIT

//! Tagged message payloads exchanged between clients, workers, and the
//! API process. One variant per row of the Message Handler's dispatch
//! table, plus the outbound broadcast/response types it produces.
//!
//! Deserialization never fails on an unrecognized `type` tag — it falls
//! through to [`Payload::Unknown`] so the dispatcher can log and drop
//! it rather than tearing down the connection.

use jobmesh_core::{JobRequirements, JobStatus, WorkerCapabilities};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    // --- inbound, client -> API ---
    SubmitJob {
        service_required: String,
        #[serde(default)]
        priority: i32,
        payload: Value,
        #[serde(default)]
        requirements: JobRequirements,
        #[serde(default)]
        customer_id: Option<String>,
        #[serde(default)]
        max_retries: i32,
    },
    CancelJob {
        job_id: String,
        #[serde(default)]
        reason: Option<String>,
    },
    SyncJobState {
        #[serde(default)]
        job_id: Option<String>,
    },

    // --- inbound, worker -> API ---
    RegisterWorker {
        worker_id: String,
        machine_id: String,
        capabilities: WorkerCapabilities,
        version: String,
    },
    WorkerHeartbeat {
        worker_id: String,
        #[serde(default)]
        system_info: Value,
    },
    WorkerStatusUpdate {
        worker_id: String,
        status: String,
    },
    UpdateJobProgress {
        job_id: String,
        worker_id: String,
        progress_pct: f64,
        #[serde(default)]
        message: String,
        #[serde(default)]
        current_step: u32,
        #[serde(default)]
        total_steps: u32,
        #[serde(default)]
        estimated_completion_ms: Option<i64>,
    },
    CompleteJob {
        job_id: String,
        worker_id: String,
        result: Value,
    },
    FailJob {
        job_id: String,
        worker_id: String,
        error: String,
        #[serde(default)]
        can_retry: bool,
    },
    ServiceRequest {
        worker_id: String,
        service: String,
        detail: Value,
    },

    // --- outbound ---
    Ack {
        ok: bool,
    },
    JobAvailable {
        job_id: String,
        service_required: String,
        priority: i32,
    },
    JobAssigned {
        job_id: String,
        worker_id: String,
        job: Value,
    },
    JobStateChanged {
        job_id: String,
        status: JobStatus,
        #[serde(default)]
        error: Option<String>,
    },
    ProgressUpdate {
        job_id: String,
        progress_pct: f64,
        #[serde(default)]
        message: String,
    },
    StatsBroadcast {
        queued: u64,
        in_progress: u64,
        idle_workers: u64,
        busy_workers: u64,
    },
    FullStateSnapshot {
        jobs: Vec<Value>,
        workers: Vec<Value>,
        machines: Vec<Value>,
    },
    Error {
        code: String,
        message: String,
    },
    /// Application-level liveness probe pushed to every connection by
    /// `ConnectionManager::ping_all`, distinct from the transport's own
    /// WebSocket ping/pong frames.
    Ping,
    Pong,

    /// One fragment of a chunked-transport split, base64-encoded.
    /// Always carries a [`crate::chunk::ChunkInfo`] on the enclosing
    /// envelope; the reassembled bytes decode back into a complete
    /// envelope of the original message.
    ChunkFragment {
        data: String,
    },

    /// Any `type` tag this version doesn't recognize. Logged and
    /// dropped by the dispatcher, never guessed at.
    #[serde(other)]
    Unknown,
}

impl Payload {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Payload::SubmitJob { .. } => "submit_job",
            Payload::CancelJob { .. } => "cancel_job",
            Payload::SyncJobState { .. } => "sync_job_state",
            Payload::RegisterWorker { .. } => "register_worker",
            Payload::WorkerHeartbeat { .. } => "worker_heartbeat",
            Payload::WorkerStatusUpdate { .. } => "worker_status_update",
            Payload::UpdateJobProgress { .. } => "update_job_progress",
            Payload::CompleteJob { .. } => "complete_job",
            Payload::FailJob { .. } => "fail_job",
            Payload::ServiceRequest { .. } => "service_request",
            Payload::Ack { .. } => "ack",
            Payload::JobAvailable { .. } => "job_available",
            Payload::JobAssigned { .. } => "job_assigned",
            Payload::JobStateChanged { .. } => "job_state_changed",
            Payload::ProgressUpdate { .. } => "progress_update",
            Payload::StatsBroadcast { .. } => "stats_broadcast",
            Payload::FullStateSnapshot { .. } => "full_state_snapshot",
            Payload::Error { .. } => "error",
            Payload::Ping => "ping",
            Payload::Pong => "pong",
            Payload::ChunkFragment { .. } => "chunk_fragment",
            Payload::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_job_round_trips_through_json() {
        let p = Payload::SubmitJob {
            service_required: "comfyui".into(),
            priority: 80,
            payload: serde_json::json!({"workflow": "txt2img"}),
            requirements: JobRequirements::default(),
            customer_id: Some("acme".into()),
            max_retries: 3,
        };
        let json = serde_json::to_string(&p).expect("serialize");
        let back: Payload = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(p, back);
    }

    #[test]
    fn known_type_with_missing_required_field_is_rejected() {
        let json = r#"{"type":"submit_job"}"#; // missing required fields
        let result: Result<Payload, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn chunk_fragment_round_trips_through_json() {
        let p = Payload::ChunkFragment { data: "aGVsbG8=".into() };
        let json = serde_json::to_string(&p).expect("serialize");
        let back: Payload = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(p, back);
    }

    #[test]
    fn unrecognized_tag_becomes_unknown_variant() {
        let json = r#"{"type":"frobnicate_widget","foo":1}"#;
        let p: Payload = serde_json::from_str(json).expect("deserialize");
        assert_eq!(p, Payload::Unknown);
    }
}
