// SPDX-License-Identifier: MIT

//! Connector for a ComfyUI instance, driven over its native WebSocket
//! execution-progress channel: submit a prompt over HTTP, then read
//! `executing`/`progress`/`executed` frames off the socket until the
//! workflow finishes or the connection drops.

use async_trait::async_trait;
use futures_util::StreamExt;
use jobmesh_core::Job;
use serde::Deserialize;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::connector::{Connector, ConnectorCapabilities, ProgressSink};
use crate::error::{ConnectorError, ConnectorResult};

#[derive(Debug, Clone)]
pub struct ComfyUiConfig {
    pub service_tag: String,
    /// `host:port` of the ComfyUI HTTP/WS server, e.g. `127.0.0.1:8188`.
    pub addr: String,
    pub client_id: String,
}

pub struct ComfyUiConnector {
    config: ComfyUiConfig,
    http: reqwest::Client,
}

impl ComfyUiConnector {
    pub fn new(config: ComfyUiConfig) -> Self {
        Self { config, http: reqwest::Client::new() }
    }

    async fn submit_prompt(&self, workflow: &serde_json::Value) -> ConnectorResult<String> {
        let body = serde_json::json!({ "prompt": workflow, "client_id": self.config.client_id });
        let resp = self
            .http
            .post(format!("http://{}/prompt", self.config.addr))
            .json(&body)
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ConnectorError::Rejected(format!("comfyui returned {}", resp.status())));
        }
        let parsed: PromptResponse =
            resp.json().await.map_err(|e| ConnectorError::Transport(e.to_string()))?;
        Ok(parsed.prompt_id)
    }

    async fn connect_ws(
        &self,
    ) -> ConnectorResult<tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>> {
        let stream = tokio::net::TcpStream::connect(&self.config.addr)
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        let uri = format!("ws://{}/ws?clientId={}", self.config.addr, self.config.client_id);
        let (ws, _) = tokio_tungstenite::client_async(&uri, stream)
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        Ok(ws)
    }
}

#[derive(Deserialize)]
struct PromptResponse {
    prompt_id: String,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ComfyEvent {
    Progress { data: ProgressData },
    Executing { data: ExecutingData },
    #[serde(other)]
    Other,
}

#[derive(Deserialize)]
struct ProgressData {
    value: u32,
    max: u32,
}

#[derive(Deserialize)]
struct ExecutingData {
    node: Option<String>,
    prompt_id: Option<String>,
}

#[async_trait]
impl Connector for ComfyUiConnector {
    async fn initialize(&self) -> ConnectorResult<()> {
        self.health_check().await
    }

    async fn cleanup(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> ConnectorResult<()> {
        self.http
            .get(format!("http://{}/system_stats", self.config.addr))
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
        let prompt_id = self.submit_prompt(&job.payload).await?;
        sink.set_service_job_id(&prompt_id).await;
        let ws = self.connect_ws().await?;
        let (_, mut read) = ws.split();

        let mut last_step = 0u32;
        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let Ok(event) = serde_json::from_str::<ComfyEvent>(&text) else { continue };
                            match event {
                                ComfyEvent::Progress { data } => {
                                    last_step = data.value;
                                    let pct = if data.max > 0 { (data.value as f64 / data.max as f64) * 100.0 } else { 0.0 };
                                    sink.report(pct, "executing", data.value, data.max, None).await;
                                }
                                ComfyEvent::Executing { data } => {
                                    if data.node.is_none() && data.prompt_id.as_deref() == Some(prompt_id.as_str()) {
                                        sink.report(100.0, "done", last_step.max(1), last_step.max(1), None).await;
                                        return Ok(serde_json::json!({ "prompt_id": prompt_id }));
                                    }
                                }
                                ComfyEvent::Other => {}
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(ConnectorError::Transport("comfyui websocket closed before completion".into()));
                        }
                        Some(Err(e)) => return Err(ConnectorError::Transport(e.to_string())),
                        _ => {}
                    }
                }
                _ = cancel.cancelled() => {
                    let _ = self.cancel(&prompt_id).await;
                    return Err(ConnectorError::Cancelled);
                }
            }
        }
    }

    async fn cancel(&self, service_job_id: &str) -> ConnectorResult<()> {
        let body = serde_json::json!({ "delete": [service_job_id] });
        self.http
            .post(format!("http://{}/queue", self.config.addr))
            .json(&body)
            .send()
            .await
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;
        Ok(())
    }
}
