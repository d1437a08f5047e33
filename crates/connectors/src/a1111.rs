// SPDX-License-Identifier: MIT

//! Connector for an Automatic1111 instance: submit a generation request
//! over HTTP, then poll its progress endpoint until it reports
//! completion. Automatic1111 has no push channel, so this is a simple
//! poll loop rather than an event bridge.

use async_trait::async_trait;
use jobmesh_core::Job;
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::connector::{Connector, ConnectorCapabilities, ProgressSink};
use crate::error::{ConnectorError, ConnectorResult};

#[derive(Debug, Clone)]
pub struct A1111Config {
    pub service_tag: String,
    pub base_url: String,
    pub poll_interval: Duration,
    /// `img2img`/`txt2img`/... path segment under `/sdapi/v1/`.
    pub endpoint: String,
}

pub struct A1111Connector {
    config: A1111Config,
    http: reqwest::Client,
}

impl A1111Connector {
    pub fn new(config: A1111Config) -> Self {
        Self { config, http: reqwest::Client::new() }
    }

    async fn poll_progress(&self) -> ConnectorResult<ProgressResponse> {
        let resp = self
            .http
            .get(format!("{}/sdapi/v1/progress", self.config.base_url))
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        resp.json().await.map_err(|e| ConnectorError::Transport(e.to_string()))
    }
}

#[derive(Deserialize)]
struct ProgressResponse {
    progress: f64,
    eta_relative: f64,
    state: ProgressState,
}

#[derive(Deserialize)]
struct ProgressState {
    job_count: u32,
    #[serde(default)]
    sampling_step: u32,
    #[serde(default)]
    sampling_steps: u32,
}

#[async_trait]
impl Connector for A1111Connector {
    async fn initialize(&self) -> ConnectorResult<()> {
        self.health_check().await
    }

    async fn cleanup(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> ConnectorResult<()> {
        self.http
            .get(format!("{}/sdapi/v1/progress", self.config.base_url))
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        Ok(())
    }

    fn can_process(&self, job: &Job) -> bool {
        job.service_required == self.config.service_tag
    }

    fn capabilities(&self) -> ConnectorCapabilities {
        ConnectorCapabilities { service_tag: self.config.service_tag.clone(), max_concurrent: 1 }
    }

    async fn process(
        &self,
        job: &Job,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> ConnectorResult<serde_json::Value> {
        let submit_path = format!("{}/sdapi/v1/{}", self.config.base_url, self.config.endpoint);
        sink.set_service_job_id(&submit_path).await;

        let submit = self.http.post(&submit_path).json(&job.payload).send();
        let submitted = tokio::select! {
            result = submit => result.map_err(|e| ConnectorError::Transport(e.to_string()))?,
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
        };
        if !submitted.status().is_success() {
            return Err(ConnectorError::Rejected(format!("a1111 returned {}", submitted.status())));
        }
        let body: serde_json::Value =
            submitted.json().await.map_err(|e| ConnectorError::Transport(e.to_string()))?;

        loop {
            tokio::select! {
                progress = self.poll_progress() => {
                    let progress = progress?;
                    let total = progress.state.sampling_steps.max(1);
                    let step = progress.state.sampling_step;
                    let eta_ms = (progress.eta_relative * 1000.0) as i64;
                    sink.report(progress.progress * 100.0, "sampling", step, total, Some(eta_ms)).await;
                    if progress.state.job_count == 0 && progress.progress >= 1.0 {
                        return Ok(body);
                    }
                }
                _ = cancel.cancelled() => {
                    let _ = self.cancel(&submit_path).await;
                    return Err(ConnectorError::Cancelled);
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                _ = cancel.cancelled() => {
                    let _ = self.cancel(&submit_path).await;
                    return Err(ConnectorError::Cancelled);
                }
            }
        }
    }

    async fn cancel(&self, _service_job_id: &str) -> ConnectorResult<()> {
        self.http
            .post(format!("{}/sdapi/v1/skip", self.config.base_url))
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        Ok(())
    }
}
