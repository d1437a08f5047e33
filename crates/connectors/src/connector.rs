// SPDX-License-Identifier: MIT

//! The `Connector` trait: the seam between the worker runtime and a
//! concrete backend (ComfyUI, Automatic1111, an OpenAI-compatible API,
//! or the in-process simulator used in tests).
//!
//! Progress flows one way, through [`ProgressSink`], so a connector never
//! needs a handle back to the worker or broker — it only needs somewhere
//! to report into and a token telling it when to stop.

use async_trait::async_trait;
use jobmesh_core::Job;
use tokio_util::sync::CancellationToken;

use crate::error::ConnectorResult;

/// Receives progress frames emitted mid-`process`. Implemented by the
/// worker runtime, which forwards reports to the broker.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(
        &self,
        progress_pct: f64,
        message: &str,
        current_step: u32,
        total_steps: u32,
        estimated_completion_ms: Option<i64>,
    );

    /// Record the backend's own identifier for this job so a later
    /// cancel or orphan-recovery pass can target it. Connectors that
    /// talk to an external backend must call this before any blocking
    /// wait; connectors with no external id (the simulator) can ignore
    /// it via the default no-op.
    async fn set_service_job_id(&self, _service_job_id: &str) {}
}

/// A `ProgressSink` that discards every report, for tests and dry runs.
pub struct NullProgressSink;

#[async_trait]
impl ProgressSink for NullProgressSink {
    async fn report(&self, _: f64, _: &str, _: u32, _: u32, _: Option<i64>) {}
}

/// Declared capacity and identity of a connector, advertised to the
/// registry that picks one by service tag.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorCapabilities {
    pub service_tag: String,
    pub max_concurrent: u32,
}

/// A backend a worker can dispatch jobs to.
///
/// Connectors must set the job's external `service_job_id` via the
/// broker before any blocking wait, so a cancellation or orphan-recovery
/// pass has something to target on the backend side.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn initialize(&self) -> ConnectorResult<()>;

    async fn cleanup(&self) -> ConnectorResult<()>;

    async fn health_check(&self) -> ConnectorResult<()>;

    fn can_process(&self, job: &Job) -> bool;

    fn capabilities(&self) -> ConnectorCapabilities;

    /// Run `job` to completion, reporting progress through `sink` and
    /// returning the final result payload. `cancel` is observed
    /// cooperatively: once triggered, the connector should abandon the
    /// job and return `Err(ConnectorError::Cancelled)` as soon as it can.
    async fn process(
        &self,
        job: &Job,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> ConnectorResult<serde_json::Value>;

    /// Best-effort request to stop a job already in flight, identified by
    /// its external `service_job_id` rather than the internal job id.
    async fn cancel(&self, service_job_id: &str) -> ConnectorResult<()>;
}
