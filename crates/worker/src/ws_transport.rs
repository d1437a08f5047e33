// SPDX-License-Identifier: MIT

//! [`BrokerClient`] implementation over a WebSocket connection to
//! `jobmesh-api`'s `/ws/worker/<id>` route. One request is in flight at
//! a time on this connection — the pull loop never issues a second
//! write before the first's reply arrives — so replies are correlated
//! by arrival order rather than a message id, via a single pending
//! oneshot slot. Unsolicited `cancel_job` pushes are diverted to a
//! queue that [`BrokerClient::poll_cancel`] drains.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use jobmesh_core::{Clock, Job, ProgressFrame, SystemClock, WorkerCapabilities};
use jobmesh_wire::{Envelope, Payload};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::warn;

use crate::transport::{BrokerClient, CancelNotice, TransportError, TransportResult};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

enum WsReply {
    Ack(bool),
    Job(Job),
    Error(String),
}

pub struct WsBrokerClient {
    sink: AsyncMutex<WsSink>,
    pending: Arc<Mutex<Option<oneshot::Sender<WsReply>>>>,
    cancels: Arc<Mutex<VecDeque<CancelNotice>>>,
}

impl WsBrokerClient {
    /// Connect to `ws://<addr>/ws/worker/<worker_id>` and spawn the
    /// background reader task that demultiplexes server pushes.
    pub async fn connect(addr: &str, worker_id: &str) -> TransportResult<Self> {
        let url = format!("ws://{addr}/ws/worker/{worker_id}");
        let (stream, _) = tokio_tungstenite::connect_async(&url)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let (sink, mut read) = stream.split();

        let pending: Arc<Mutex<Option<oneshot::Sender<WsReply>>>> = Arc::new(Mutex::new(None));
        let cancels = Arc::new(Mutex::new(VecDeque::new()));

        let pending_task = pending.clone();
        let cancels_task = cancels.clone();
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                let Ok(Message::Text(text)) = msg else { continue };
                let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else { continue };
                match envelope.payload {
                    Payload::CancelJob { job_id, reason } => {
                        cancels_task.lock().push_back(CancelNotice { job_id, reason });
                    }
                    Payload::Ack { ok } => {
                        if let Some(tx) = pending_task.lock().take() {
                            let _ = tx.send(WsReply::Ack(ok));
                        }
                    }
                    Payload::JobAssigned { job, .. } => {
                        if let Some(tx) = pending_task.lock().take() {
                            match serde_json::from_value::<Job>(job) {
                                Ok(job) => {
                                    let _ = tx.send(WsReply::Job(job));
                                }
                                Err(e) => {
                                    let _ = tx.send(WsReply::Error(e.to_string()));
                                }
                            }
                        }
                    }
                    Payload::Error { message, .. } => {
                        if let Some(tx) = pending_task.lock().take() {
                            let _ = tx.send(WsReply::Error(message));
                        }
                    }
                    _ => {}
                }
            }
        });

        Ok(Self { sink: AsyncMutex::new(sink), pending, cancels })
    }

    async fn send(&self, payload: Payload) -> TransportResult<()> {
        let envelope = Envelope::new(payload, SystemClock.epoch_ms());
        let json = serde_json::to_string(&envelope)
            .map_err(|e| TransportError::Connection(e.to_string()))?;
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(json)).await.map_err(|e| TransportError::Connection(e.to_string()))
    }

    async fn request(&self, payload: Payload) -> TransportResult<WsReply> {
        let (tx, rx) = oneshot::channel();
        *self.pending.lock() = Some(tx);
        self.send(payload).await?;
        rx.await.map_err(|_| TransportError::Connection("connection closed before reply".into()))
    }
}

#[async_trait]
impl BrokerClient for WsBrokerClient {
    async fn register(&self, worker_id: &str, machine_id: &str, capabilities: &WorkerCapabilities, version: &str) -> TransportResult<()> {
        match self
            .request(Payload::RegisterWorker {
                worker_id: worker_id.to_string(),
                machine_id: machine_id.to_string(),
                capabilities: capabilities.clone(),
                version: version.to_string(),
            })
            .await?
        {
            WsReply::Ack(true) => Ok(()),
            WsReply::Ack(false) => Err(TransportError::Rejected("registration rejected".into())),
            WsReply::Error(msg) => Err(TransportError::Rejected(msg)),
            WsReply::Job(_) => Err(TransportError::Connection("unexpected job reply to register".into())),
        }
    }

    async fn heartbeat(&self, worker_id: &str, system_info: serde_json::Value) -> TransportResult<()> {
        match self
            .request(Payload::WorkerHeartbeat { worker_id: worker_id.to_string(), system_info })
            .await?
        {
            WsReply::Ack(_) => Ok(()),
            WsReply::Error(msg) => Err(TransportError::Rejected(msg)),
            WsReply::Job(_) => Ok(()),
        }
    }

    async fn claim_next(&self, worker_id: &str, capabilities: &WorkerCapabilities) -> TransportResult<Option<Job>> {
        let detail = serde_json::to_value(capabilities).unwrap_or_default();
        match self
            .request(Payload::ServiceRequest { worker_id: worker_id.to_string(), service: "claim_next".into(), detail })
            .await?
        {
            WsReply::Job(job) => Ok(Some(job)),
            WsReply::Ack(_) => Ok(None),
            WsReply::Error(msg) => {
                warn!(error = %msg, "claim_next rejected");
                Ok(None)
            }
        }
    }

    async fn report_progress(&self, frame: &ProgressFrame) -> TransportResult<()> {
        self.send(Payload::UpdateJobProgress {
            job_id: frame.job_id.clone(),
            worker_id: frame.worker_id.clone(),
            progress_pct: frame.progress_pct,
            message: frame.message.clone(),
            current_step: frame.current_step,
            total_steps: frame.total_steps,
            estimated_completion_ms: frame.estimated_completion_ms,
        })
        .await
    }

    async fn complete(&self, job_id: &str, result: serde_json::Value) -> TransportResult<()> {
        self.send(Payload::CompleteJob { job_id: job_id.to_string(), worker_id: String::new(), result }).await
    }

    async fn fail(&self, job_id: &str, error: &str, can_retry: bool) -> TransportResult<()> {
        self.send(Payload::FailJob { job_id: job_id.to_string(), worker_id: String::new(), error: error.to_string(), can_retry }).await
    }

    async fn release(&self, job_id: &str, worker_id: &str) -> TransportResult<()> {
        self.send(Payload::ServiceRequest {
            worker_id: worker_id.to_string(),
            service: "release".into(),
            detail: serde_json::json!({ "job_id": job_id }),
        })
        .await
    }

    async fn set_service_job_id(&self, job_id: &str, service_job_id: &str) -> TransportResult<()> {
        self.send(Payload::ServiceRequest {
            worker_id: String::new(),
            service: "set_service_job_id".into(),
            detail: serde_json::json!({ "job_id": job_id, "service_job_id": service_job_id }),
        })
        .await
    }

    async fn poll_cancel(&self) -> Option<CancelNotice> {
        self.cancels.lock().pop_front()
    }
}
