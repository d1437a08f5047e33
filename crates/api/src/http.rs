// SPDX-License-Identifier: MIT

//! REST routes. Each handler deserializes, calls into the Broker or
//! Fabric, and serializes the response — no domain logic lives here.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::Stream;
use jobmesh_broker::{BrokerStats, JobFilter};
use jobmesh_core::{Clock, Job, JobStatus, MachineSnapshot, WorkerRecord};
use jobmesh_store::Sss;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub fn router<S: Sss + 'static, C: Clock + 'static>() -> Router<AppState<S, C>> {
    Router::new()
        .route("/health", get(health::<S, C>))
        .route("/api/jobs", post(submit_job::<S, C>).get(list_jobs::<S, C>))
        .route("/api/jobs/:id", get(get_job::<S, C>))
        .route("/api/jobs/:id/progress", get(job_progress::<S, C>))
        .route("/api/jobs/:id/cancel", post(cancel_job::<S, C>))
        .route("/api/workers", get(list_workers::<S, C>))
        .route("/api/machines", get(list_machines::<S, C>))
        .route("/api/stats", get(stats::<S, C>))
}

async fn health<S: Sss, C: Clock>(State(state): State<AppState<S, C>>) -> impl IntoResponse {
    match state.sss.hget("health:ping", "at").await {
        Ok(_) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "unavailable", "error": e.to_string() }))),
    }
}

#[derive(Debug, Deserialize)]
struct SubmitJobBody {
    service_required: String,
    #[serde(default)]
    priority: i32,
    payload: serde_json::Value,
    #[serde(default)]
    requirements: jobmesh_core::JobRequirements,
    #[serde(default)]
    customer_id: Option<String>,
    #[serde(default)]
    max_retries: i32,
}

async fn submit_job<S: Sss, C: Clock>(
    State(state): State<AppState<S, C>>,
    Json(body): Json<SubmitJobBody>,
) -> ApiResult<impl IntoResponse> {
    let request = jobmesh_broker::SubmitJobRequest {
        service_required: body.service_required,
        priority: body.priority,
        payload: body.payload,
        requirements: body.requirements,
        customer_id: body.customer_id,
        max_retries: body.max_retries,
    };
    let job_id = state.broker.submit_job(request).await?;
    Ok((StatusCode::CREATED, Json(json!({ "job_id": job_id, "status": "queued" }))))
}

async fn get_job<S: Sss, C: Clock>(State(state): State<AppState<S, C>>, Path(id): Path<String>) -> ApiResult<Json<Job>> {
    match state.broker.get_job(&id).await? {
        Some(job) => Ok(Json(job)),
        None => Err(ApiError::Broker(jobmesh_broker::BrokerError::JobNotFound(id))),
    }
}

#[derive(Debug, Deserialize)]
struct ListJobsQuery {
    status: Option<JobStatus>,
    #[serde(default = "default_limit")]
    limit: usize,
    #[serde(default)]
    offset: usize,
}

fn default_limit() -> usize {
    100
}

async fn list_jobs<S: Sss, C: Clock>(
    State(state): State<AppState<S, C>>,
    Query(query): Query<ListJobsQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let filter = JobFilter { status: query.status, customer_id: None };
    let jobs = state.broker.list_jobs(&filter, query.limit, query.offset).await?;
    Ok(Json(jobs))
}

async fn list_workers<S: Sss, C: Clock>(State(state): State<AppState<S, C>>) -> ApiResult<Json<Vec<WorkerRecord>>> {
    Ok(Json(state.broker.list_workers().await?))
}

async fn stats<S: Sss, C: Clock>(State(state): State<AppState<S, C>>) -> ApiResult<Json<BrokerStats>> {
    Ok(Json(state.broker.stats().await?))
}

/// Same zset-index-plus-hash layout the Broker uses for jobs/workers,
/// mirrored here since machine snapshots are written by `jobmesh-machine`
/// directly rather than through the Broker.
const MACHINE_INDEX_KEY: &str = "index:machines";

fn machine_key(machine_id: &str) -> String {
    format!("machine:{machine_id}")
}

async fn list_machines<S: Sss, C: Clock>(
    State(state): State<AppState<S, C>>,
) -> ApiResult<Json<Vec<MachineSnapshot>>> {
    let ids = state.sss.zrangebyscore(MACHINE_INDEX_KEY, f64::MIN, f64::MAX).await.map_err(jobmesh_broker::BrokerError::Store)?;
    let mut machines = Vec::new();
    for scored in ids {
        let raw = state.sss.hget(&machine_key(&scored.member), "data").await.map_err(jobmesh_broker::BrokerError::Store)?;
        if let Some(raw) = raw {
            if let Ok(snapshot) = serde_json::from_str::<MachineSnapshot>(&raw) {
                machines.push(snapshot);
            }
        }
    }
    Ok(Json(machines))
}

#[derive(Debug, Default, Deserialize)]
struct CancelJobBody {
    #[serde(default)]
    reason: Option<String>,
}

async fn cancel_job<S: Sss, C: Clock>(
    State(state): State<AppState<S, C>>,
    Path(id): Path<String>,
    Json(body): Json<CancelJobBody>,
) -> ApiResult<impl IntoResponse> {
    state.broker.cancel(&id, body.reason).await?;
    Ok(Json(json!({ "job_id": id, "status": "cancelled" })))
}

/// Server-Sent Events stream of progress frames for one job: an
/// initial `connected` event, one `data:` frame per progress update,
/// then a final terminal event once the job reaches a terminal
/// status.
async fn job_progress<S: Sss + 'static, C: Clock + 'static>(
    State(state): State<AppState<S, C>>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    if state.broker.get_job(&id).await?.is_none() {
        return Err(ApiError::Broker(jobmesh_broker::BrokerError::JobNotFound(id)));
    }

    let broker = state.broker.clone();
    let mut rx = state.fabric.subscribe(&id).await;
    let job_id = id.clone();

    // Frames and the terminal-status poll race concurrently over one
    // select! loop so a quiet job still closes the stream once it
    // reaches a terminal status, rather than waiting forever on
    // `frames` (which only ends when the fabric drops its sender).
    let (tx, out_rx) = mpsc::channel(32);
    tokio::spawn(async move {
        if tx.send(Ok(Event::default().event("connected").data("{}"))).await.is_err() {
            return;
        }
        let mut terminal_poll = tokio::time::interval(Duration::from_millis(500));
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let Some(frame) = frame else { return };
                    if let Ok(data) = serde_json::to_string(&frame) {
                        if tx.send(Ok(Event::default().event("progress").data(data))).await.is_err() {
                            return;
                        }
                    }
                }
                _ = terminal_poll.tick() => {
                    if let Ok(Some(job)) = broker.get_job(&job_id).await {
                        if job.status.is_terminal() {
                            let tag = match job.status {
                                JobStatus::Completed => "completed",
                                JobStatus::Cancelled => "cancelled",
                                _ => "failed",
                            };
                            let _ = tx.send(Ok(Event::default().event(tag).data("{}"))).await;
                            return;
                        }
                    }
                }
            }
        }
    });

    Ok(Sse::new(ReceiverStream::new(out_rx)).keep_alive(KeepAlive::default()))
}
