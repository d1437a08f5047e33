// SPDX-License-Identifier: MIT

//! In-memory [`BrokerClient`] used to unit-test the pull loop without a
//! network round trip.

use async_trait::async_trait;
use jobmesh_core::{Job, ProgressFrame, WorkerCapabilities};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::transport::{BrokerClient, CancelNotice, TransportResult};

#[derive(Default)]
pub struct FakeTransport {
    pub pending_jobs: Mutex<VecDeque<Job>>,
    pub pending_cancels: Mutex<VecDeque<CancelNotice>>,
    pub progress_reports: Mutex<Vec<ProgressFrame>>,
    pub completions: Mutex<Vec<(String, serde_json::Value)>>,
    pub failures: Mutex<Vec<(String, String, bool)>>,
    pub releases: Mutex<Vec<String>>,
    pub heartbeats: Arc<Mutex<u32>>,
    pub service_job_ids: Mutex<Vec<(String, String)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_job(&self, job: Job) {
        self.pending_jobs.lock().push_back(job);
    }

    pub fn push_cancel(&self, job_id: impl Into<String>, reason: Option<String>) {
        self.pending_cancels.lock().push_back(CancelNotice { job_id: job_id.into(), reason });
    }
}

#[async_trait]
impl BrokerClient for FakeTransport {
    async fn register(&self, _: &str, _: &str, _: &WorkerCapabilities, _: &str) -> TransportResult<()> {
        Ok(())
    }

    async fn heartbeat(&self, _: &str, _: serde_json::Value) -> TransportResult<()> {
        *self.heartbeats.lock() += 1;
        Ok(())
    }

    async fn claim_next(&self, _: &str, _: &WorkerCapabilities) -> TransportResult<Option<Job>> {
        Ok(self.pending_jobs.lock().pop_front())
    }

    async fn report_progress(&self, frame: &ProgressFrame) -> TransportResult<()> {
        self.progress_reports.lock().push(frame.clone());
        Ok(())
    }

    async fn complete(&self, job_id: &str, result: serde_json::Value) -> TransportResult<()> {
        self.completions.lock().push((job_id.to_string(), result));
        Ok(())
    }

    async fn fail(&self, job_id: &str, error: &str, can_retry: bool) -> TransportResult<()> {
        self.failures.lock().push((job_id.to_string(), error.to_string(), can_retry));
        Ok(())
    }

    async fn release(&self, job_id: &str, _: &str) -> TransportResult<()> {
        self.releases.lock().push(job_id.to_string());
        Ok(())
    }

    async fn set_service_job_id(&self, job_id: &str, service_job_id: &str) -> TransportResult<()> {
        self.service_job_ids.lock().push((job_id.to_string(), service_job_id.to_string()));
        Ok(())
    }

    async fn poll_cancel(&self) -> Option<CancelNotice> {
        self.pending_cancels.lock().pop_front()
    }
}
