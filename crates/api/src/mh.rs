// SPDX-License-Identifier: MIT

//! Message Handler: translates [`Payload`] variants arriving over a
//! WebSocket connection into Broker calls, and the Broker's results
//! back into outbound payloads — to the sender directly, and to
//! whichever other connections need to hear about the state change.
//! Thin by design: every row here is deserialize, call Broker/CM,
//! serialize.

use jobmesh_core::{ConnectionKind, ProgressFrame, WorkerCapabilities, WorkerRecord};
use jobmesh_store::Sss;
use tracing::warn;

use crate::state::AppState;

/// Process one inbound payload from `conn_id` of kind `kind`. Returns
/// the reply owed directly to the sender, if any — `ServiceRequest`,
/// `RegisterWorker`, and `WorkerHeartbeat` always produce one since
/// the worker transport blocks on a single pending reply slot.
pub async fn handle<S, C>(
    state: &AppState<S, C>,
    kind: ConnectionKind,
    conn_id: &str,
    payload: jobmesh_wire::Payload,
) -> Option<jobmesh_wire::Payload>
where
    S: Sss + 'static,
    C: jobmesh_core::Clock + 'static,
{
    use jobmesh_wire::Payload;

    let now = state.clock.epoch_ms();
    match payload {
        Payload::SubmitJob { service_required, priority, payload, requirements, customer_id, max_retries } => {
            let request = jobmesh_broker::SubmitJobRequest { service_required: service_required.clone(), priority, payload, requirements, customer_id, max_retries };
            match state.broker.submit_job(request).await {
                Ok(job_id) => {
                    state
                        .cm
                        .broadcast(ConnectionKind::Worker, Payload::JobAvailable { job_id: job_id.clone(), service_required, priority }, now)
                        .await;
                    state.cm.broadcast(ConnectionKind::Monitor, Payload::JobStateChanged { job_id: job_id.clone(), status: jobmesh_core::JobStatus::Queued, error: None }, now).await;
                    Some(Payload::JobStateChanged { job_id, status: jobmesh_core::JobStatus::Queued, error: None })
                }
                Err(e) => Some(Payload::Error { code: "invalid_job".into(), message: e.to_string() }),
            }
        }

        Payload::CancelJob { job_id, reason } => match state.broker.cancel(&job_id, reason).await {
            Ok(worker_id) => {
                if let Some(worker_id) = worker_id {
                    state.cm.send_to(ConnectionKind::Worker, &worker_id, Payload::CancelJob { job_id: job_id.clone(), reason: None }, now).await;
                }
                let broadcast = Payload::JobStateChanged { job_id: job_id.clone(), status: jobmesh_core::JobStatus::Cancelled, error: None };
                state.cm.broadcast(ConnectionKind::Monitor, broadcast.clone(), now).await;
                Some(Payload::Ack { ok: true })
            }
            Err(e) => Some(Payload::Error { code: "cancel_failed".into(), message: e.to_string() }),
        },

        Payload::SyncJobState { job_id } => {
            if let Err(e) = state.broker.detect_orphans(state.config.heartbeat_interval_ms).await {
                warn!(error = %e, "orphan detection failed during sync_job_state");
            }
            match job_id {
                Some(job_id) => match state.broker.get_job(&job_id).await {
                    Ok(Some(job)) => Some(Payload::JobStateChanged { job_id, status: job.status, error: job.error }),
                    Ok(None) => Some(Payload::Error { code: "job_not_found".into(), message: format!("job {job_id} not found") }),
                    Err(e) => Some(Payload::Error { code: "sync_failed".into(), message: e.to_string() }),
                },
                None => full_state_snapshot(state).await,
            }
        }

        Payload::RegisterWorker { worker_id, machine_id, capabilities, version } => {
            let record = WorkerRecord::new(worker_id.clone(), machine_id, capabilities.clone(), version, now);
            match state.broker.register_worker(&record).await {
                Ok(()) => {
                    state.cm.register_worker_capabilities(&worker_id, capabilities).await;
                    Some(Payload::Ack { ok: true })
                }
                Err(e) => Some(Payload::Error { code: "register_failed".into(), message: e.to_string() }),
            }
        }

        Payload::WorkerHeartbeat { worker_id, .. } => match state.broker.heartbeat(&worker_id).await {
            Ok(()) => Some(Payload::Ack { ok: true }),
            Err(e) => Some(Payload::Error { code: "heartbeat_failed".into(), message: e.to_string() }),
        },

        Payload::WorkerStatusUpdate { worker_id, status } => {
            match state.broker.load_worker(&worker_id).await {
                Ok(Some(mut record)) => {
                    if let Ok(parsed) = serde_json::from_value::<jobmesh_core::WorkerStatus>(serde_json::Value::String(status)) {
                        record.status = parsed;
                    }
                    match state.broker.register_worker(&record).await {
                        Ok(()) => Some(Payload::Ack { ok: true }),
                        Err(e) => Some(Payload::Error { code: "status_update_failed".into(), message: e.to_string() }),
                    }
                }
                Ok(None) => Some(Payload::Error { code: "worker_not_found".into(), message: worker_id }),
                Err(e) => Some(Payload::Error { code: "status_update_failed".into(), message: e.to_string() }),
            }
        }

        Payload::UpdateJobProgress { job_id, worker_id, progress_pct, message, current_step, total_steps, estimated_completion_ms } => {
            let frame = ProgressFrame::new(job_id.clone(), worker_id, progress_pct, message.clone(), current_step, total_steps, estimated_completion_ms, now);
            if let Err(e) = state.broker.update_progress(&job_id, &frame).await {
                warn!(job_id = %job_id, error = %e, "failed to record progress");
            }
            state.cm.broadcast(ConnectionKind::Monitor, Payload::ProgressUpdate { job_id, progress_pct, message }, now).await;
            None
        }

        Payload::CompleteJob { job_id, result, .. } => {
            match state.broker.complete(&job_id, result).await {
                Ok(()) => {
                    let changed = Payload::JobStateChanged { job_id, status: jobmesh_core::JobStatus::Completed, error: None };
                    state.cm.broadcast(ConnectionKind::Monitor, changed.clone(), now).await;
                    state.cm.broadcast(ConnectionKind::Client, changed, now).await;
                }
                Err(e) => warn!(job_id = %job_id, error = %e, "complete_job failed"),
            }
            None
        }

        Payload::FailJob { job_id, error, can_retry, .. } => {
            match state.broker.fail(&job_id, error.clone(), can_retry).await {
                Ok(requeued) => {
                    let status = if requeued { jobmesh_core::JobStatus::Queued } else { jobmesh_core::JobStatus::Failed };
                    let changed = Payload::JobStateChanged { job_id, status, error: Some(error) };
                    state.cm.broadcast(ConnectionKind::Monitor, changed.clone(), now).await;
                    state.cm.broadcast(ConnectionKind::Client, changed, now).await;
                }
                Err(e) => warn!(job_id = %job_id, error = %e, "fail_job failed"),
            }
            None
        }

        Payload::ServiceRequest { worker_id, service, detail } => match service.as_str() {
            "claim_next" => {
                let capabilities: WorkerCapabilities = serde_json::from_value(detail).unwrap_or_default();
                match state.broker.claim_next(&worker_id, &capabilities).await {
                    Ok(Some(job)) => {
                        let job_id = job.id.to_string();
                        let job_value = serde_json::to_value(&job).unwrap_or_default();
                        Some(Payload::JobAssigned { job_id, worker_id, job: job_value })
                    }
                    Ok(None) => Some(Payload::Ack { ok: false }),
                    Err(e) => Some(Payload::Error { code: "claim_failed".into(), message: e.to_string() }),
                }
            }
            "release" => {
                let job_id = detail.get("job_id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                match state.broker.release(&job_id, &worker_id).await {
                    Ok(_) => Some(Payload::Ack { ok: true }),
                    Err(e) => Some(Payload::Error { code: "release_failed".into(), message: e.to_string() }),
                }
            }
            "set_service_job_id" => {
                let job_id = detail.get("job_id").and_then(|v| v.as_str()).unwrap_or_default();
                let service_job_id = detail.get("service_job_id").and_then(|v| v.as_str()).unwrap_or_default();
                match state.broker.set_service_job_id(job_id, service_job_id).await {
                    Ok(()) => Some(Payload::Ack { ok: true }),
                    Err(e) => Some(Payload::Error { code: "set_service_job_id_failed".into(), message: e.to_string() }),
                }
            }
            other => Some(Payload::Error { code: "unknown_service".into(), message: format!("unknown service request {other}") }),
        },

        Payload::Unknown => {
            warn!(%conn_id, ?kind, "dropped message with unrecognized type tag");
            None
        }

        // Outbound-only variants arriving inbound are a protocol
        // violation; log and ignore rather than tear down the connection.
        other => {
            warn!(%conn_id, ?kind, tag = other.type_tag(), "received an outbound-only payload type");
            None
        }
    }
}

async fn full_state_snapshot<S, C>(state: &AppState<S, C>) -> Option<jobmesh_wire::Payload>
where
    S: Sss + 'static,
    C: jobmesh_core::Clock + 'static,
{
    let jobs = state.broker.list_jobs(&jobmesh_broker::JobFilter::default(), 500, 0).await.ok()?;
    let jobs: Vec<serde_json::Value> = jobs.iter().filter_map(|j| serde_json::to_value(j).ok()).collect();
    Some(jobmesh_wire::Payload::FullStateSnapshot { jobs, workers: Vec::new(), machines: Vec::new() })
}
