// SPDX-License-Identifier: MIT

//! [`WorkerProbe`] is the narrow seam between the aggregator and
//! wherever worker liveness actually lives. The default implementation
//! reads heartbeat state already persisted to the SSS by the broker,
//! rather than inspecting OS processes directly — this core has no
//! process-supervision layer of its own, so "is this worker alive" is
//! answered the same way orphan recovery answers it.

use async_trait::async_trait;
use jobmesh_core::{ServiceHealth, WorkerRecord, WorkerStatus, WorkerSummary};
use jobmesh_store::Sss;
use std::collections::HashMap;
use std::sync::Arc;

pub(crate) const WORKER_INDEX_KEY: &str = "index:workers";

pub(crate) fn worker_key(worker_id: &str) -> String {
    format!("worker:{worker_id}")
}

/// A point-in-time read of the workers living on one machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerSample {
    pub workers: Vec<WorkerSummary>,
    /// Per-service-tag health, derived from the workers that advertise
    /// it: `Up` if any advertising worker is live, `Down` if every one
    /// of them has gone offline. There is no process-supervision layer
    /// in this core to ping instead.
    pub services: HashMap<String, ServiceHealth>,
}

#[async_trait]
pub trait WorkerProbe: Send + Sync {
    /// `heartbeat_interval_ms` is the worker's configured heartbeat
    /// cadence; a worker is considered offline after two missed beats.
    async fn sample(&self, machine_id: &str, now_ms: i64, heartbeat_interval_ms: i64) -> WorkerSample;
}

/// Reads worker records straight from the shared state store.
pub struct SssWorkerProbe<S: Sss> {
    sss: Arc<S>,
}

impl<S: Sss> SssWorkerProbe<S> {
    pub fn new(sss: Arc<S>) -> Self {
        Self { sss }
    }
}

#[async_trait]
impl<S: Sss> WorkerProbe for SssWorkerProbe<S> {
    async fn sample(&self, machine_id: &str, now_ms: i64, heartbeat_interval_ms: i64) -> WorkerSample {
        let Ok(scored) = self.sss.zrevrange(WORKER_INDEX_KEY, usize::MAX).await else {
            return WorkerSample::default();
        };

        let mut sample = WorkerSample::default();
        for scored_member in scored {
            let Ok(Some(raw)) = self.sss.hget(&worker_key(&scored_member.member), "data").await else { continue };
            let Ok(record) = serde_json::from_str::<WorkerRecord>(&raw) else { continue };
            if record.machine_id != machine_id {
                continue;
            }
            let alive = !record.is_expired(now_ms, heartbeat_interval_ms);
            let status = if alive { record.status } else { WorkerStatus::Offline };

            for tag in &record.capabilities.service_tags {
                let health = sample.services.entry(tag.clone()).or_insert(ServiceHealth::Down);
                if alive {
                    *health = ServiceHealth::Up;
                }
            }

            sample.workers.push(WorkerSummary {
                worker_id: record.worker_id,
                status: status.to_string(),
                active_jobs: record.current_job_ids.len(),
            });
        }
        sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobmesh_core::{Clock, FakeClock, WorkerCapabilities};

    use jobmesh_store::MemorySss;

    fn capabilities(tag: &str) -> WorkerCapabilities {
        WorkerCapabilities { service_tags: std::iter::once(tag.to_string()).collect(), ..Default::default() }
    }

    #[tokio::test]
    async fn reports_only_workers_on_the_requested_machine() {
        let sss = MemorySss::new();
        let clock = FakeClock::new();
        let w1 = WorkerRecord::new("wrk-1", "mch-a", capabilities("simulation"), "1.0", clock.epoch_ms());
        let w2 = WorkerRecord::new("wrk-2", "mch-b", capabilities("simulation"), "1.0", clock.epoch_ms());
        for w in [&w1, &w2] {
            sss.hset(&worker_key(&w.worker_id), "data", &serde_json::to_string(w).unwrap()).await.unwrap();
            sss.zadd(WORKER_INDEX_KEY, &w.worker_id, w.connected_at as f64).await.unwrap();
        }

        let probe = SssWorkerProbe::new(Arc::new(sss));
        let sample = probe.sample("mch-a", clock.epoch_ms(), 20_000).await;
        assert_eq!(sample.workers.len(), 1);
        assert_eq!(sample.workers[0].worker_id, "wrk-1");
        assert_eq!(sample.services.get("simulation"), Some(&ServiceHealth::Up));
    }

    #[tokio::test]
    async fn marks_a_worker_and_its_service_offline_once_its_heartbeat_has_expired() {
        let sss = MemorySss::new();
        let clock = FakeClock::new();
        let mut w = WorkerRecord::new("wrk-1", "mch-a", capabilities("comfyui"), "1.0", clock.epoch_ms());
        w.status = WorkerStatus::Busy;
        sss.hset(&worker_key(&w.worker_id), "data", &serde_json::to_string(&w).unwrap()).await.unwrap();
        sss.zadd(WORKER_INDEX_KEY, &w.worker_id, w.connected_at as f64).await.unwrap();

        let probe = SssWorkerProbe::new(Arc::new(sss));
        let later = clock.epoch_ms() + 100_000;
        let sample = probe.sample("mch-a", later, 20_000).await;
        assert_eq!(sample.workers[0].status, "offline");
        assert_eq!(sample.services.get("comfyui"), Some(&ServiceHealth::Down));
    }
}
