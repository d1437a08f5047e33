// SPDX-License-Identifier: MIT

//! Connector for an OpenAI-compatible HTTP endpoint. These APIs are
//! request/response, not streaming-progress-capable, so progress here
//! is coarse: queued, running, then done.

use async_trait::async_trait;
use jobmesh_core::Job;
use tokio_util::sync::CancellationToken;

use crate::connector::{Connector, ConnectorCapabilities, ProgressSink};
use crate::error::{ConnectorError, ConnectorResult};

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub service_tag: String,
    pub base_url: String,
    /// Path segment under `base_url`, e.g. `v1/chat/completions`.
    pub endpoint: String,
    pub api_key: String,
}

pub struct OpenAiConnector {
    config: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiConnector {
    pub fn new(config: OpenAiConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }
}

#[async_trait]
impl Connector for OpenAiConnector {
    async fn initialize(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn cleanup(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> ConnectorResult<()> {
        self.http
            .get(format!("{}/v1/models", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        Ok(())
    }

    fn can_process(&self, job: &Job) -> bool {
        job.service_required == self.config.service_tag
    }

    fn capabilities(&self) -> ConnectorCapabilities {
        ConnectorCapabilities { service_tag: self.config.service_tag.clone(), max_concurrent: 32 }
    }

    async fn process(
        &self,
        job: &Job,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> ConnectorResult<serde_json::Value> {
        sink.report(0.0, "queued", 0, 3, None).await;
        let url = format!("{}/{}", self.config.base_url, self.config.endpoint);
        sink.set_service_job_id(&url).await;
        sink.report(33.0, "running", 1, 3, None).await;

        let request = self.http.post(&url).bearer_auth(&self.config.api_key).json(&job.payload).send();
        let response = tokio::select! {
            result = request => result.map_err(|e| ConnectorError::Transport(e.to_string()))?,
            _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
        };
        if !response.status().is_success() {
            return Err(ConnectorError::Rejected(format!("openai endpoint returned {}", response.status())));
        }
        let body: serde_json::Value =
            response.json().await.map_err(|e| ConnectorError::Transport(e.to_string()))?;
        sink.report(100.0, "done", 3, 3, None).await;
        Ok(body)
    }

    async fn cancel(&self, _service_job_id: &str) -> ConnectorResult<()> {
        // OpenAI-compatible completion endpoints offer no server-side
        // cancellation; the worker simply stops awaiting the response.
        Ok(())
    }
}
