// SPDX-License-Identifier: MIT

//! Abstraction over how a worker talks to the broker: in tests (and for
//! a single-process deployment) this is a direct call; in production it
//! is a WebSocket connection to `jobmesh-api`'s `/ws/worker/<id>` route.
//! The pull loop in [`crate::runtime::Runtime`] is generic over this
//! trait so it can be driven deterministically in unit tests.

use async_trait::async_trait;
use jobmesh_core::{Job, ProgressFrame, WorkerCapabilities};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport connection error: {0}")]
    Connection(String),
    #[error("broker rejected the request: {0}")]
    Rejected(String),
}

pub type TransportResult<T> = Result<T, TransportError>;

/// A job the worker should stop processing and release, delivered
/// asynchronously rather than as the reply to any particular call.
#[derive(Debug, Clone)]
pub struct CancelNotice {
    pub job_id: String,
    pub reason: Option<String>,
}

#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn register(&self, worker_id: &str, machine_id: &str, capabilities: &WorkerCapabilities, version: &str) -> TransportResult<()>;

    async fn heartbeat(&self, worker_id: &str, system_info: serde_json::Value) -> TransportResult<()>;

    /// Ask for the next eligible job. `Ok(None)` means nothing matched.
    async fn claim_next(&self, worker_id: &str, capabilities: &WorkerCapabilities) -> TransportResult<Option<Job>>;

    async fn report_progress(&self, frame: &ProgressFrame) -> TransportResult<()>;

    async fn complete(&self, job_id: &str, result: serde_json::Value) -> TransportResult<()>;

    async fn fail(&self, job_id: &str, error: &str, can_retry: bool) -> TransportResult<()>;

    /// Release a job back to `queued` without recording a failure,
    /// used during graceful shutdown drain.
    async fn release(&self, job_id: &str, worker_id: &str) -> TransportResult<()>;

    /// Persist the external service's own id for this job before the
    /// connector starts blocking on that service, so crash recovery can
    /// query the downstream service directly by this id.
    async fn set_service_job_id(&self, job_id: &str, service_job_id: &str) -> TransportResult<()>;

    /// Non-blocking poll for a cancel notice targeting one of this
    /// worker's in-flight jobs. `None` means nothing pending right now.
    async fn poll_cancel(&self) -> Option<CancelNotice>;
}
