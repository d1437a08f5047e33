// SPDX-License-Identifier: MIT

//! Thin HTTP client for the jobmesh-api connection fabric. One method
//! per REST route; no retry logic here — that's the Broker's job on
//! the server side, this is just a transport wrapper.

use anyhow::{bail, Context, Result};
use jobmesh_broker::{BrokerStats, SubmitJobRequest};
use jobmesh_core::{Job, JobStatus, MachineSnapshot, WorkerRecord};
use serde::Deserialize;
use serde_json::json;

pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    pub job_id: String,
    pub status: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        bail!("jobmesh-api returned {status}: {body}")
    }

    pub async fn submit_job(&self, request: &SubmitJobRequest) -> Result<SubmitResponse> {
        let body = json!({
            "service_required": request.service_required,
            "priority": request.priority,
            "payload": request.payload,
            "requirements": request.requirements,
            "customer_id": request.customer_id,
            "max_retries": request.max_retries,
        });
        let resp = self.http.post(format!("{}/api/jobs", self.base_url)).json(&body).send().await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await.context("decoding submit_job response")?)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Job> {
        let resp = self.http.get(format!("{}/api/jobs/{job_id}", self.base_url)).send().await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await.context("decoding get_job response")?)
    }

    pub async fn list_jobs(&self, status: Option<JobStatus>, limit: usize, offset: usize) -> Result<Vec<Job>> {
        let mut req = self.http.get(format!("{}/api/jobs", self.base_url)).query(&[
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ]);
        if let Some(status) = status {
            req = req.query(&[("status", status.to_string())]);
        }
        let resp = Self::check_status(req.send().await?).await?;
        Ok(resp.json().await.context("decoding list_jobs response")?)
    }

    pub async fn cancel_job(&self, job_id: &str, reason: Option<String>) -> Result<()> {
        let resp = self
            .http
            .post(format!("{}/api/jobs/{job_id}/cancel", self.base_url))
            .json(&json!({ "reason": reason }))
            .send()
            .await?;
        Self::check_status(resp).await?;
        Ok(())
    }

    pub async fn list_workers(&self) -> Result<Vec<WorkerRecord>> {
        let resp = self.http.get(format!("{}/api/workers", self.base_url)).send().await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await.context("decoding list_workers response")?)
    }

    pub async fn list_machines(&self) -> Result<Vec<MachineSnapshot>> {
        let resp = self.http.get(format!("{}/api/machines", self.base_url)).send().await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await.context("decoding list_machines response")?)
    }

    pub async fn stats(&self) -> Result<BrokerStats> {
        let resp = self.http.get(format!("{}/api/stats", self.base_url)).send().await?;
        let resp = Self::check_status(resp).await?;
        Ok(resp.json().await.context("decoding stats response")?)
    }

    /// Opens the progress SSE stream for one job. Returns the raw
    /// response; the caller wraps its byte stream with
    /// `eventsource_stream` to decode individual SSE events.
    pub async fn job_progress_stream(&self, job_id: &str) -> Result<reqwest::Response> {
        let resp = self.http.get(format!("{}/api/jobs/{job_id}/progress", self.base_url)).send().await?;
        Self::check_status(resp).await
    }
}
