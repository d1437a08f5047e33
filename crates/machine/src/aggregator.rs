// SPDX-License-Identifier: MIT

//! The per-machine status loop: sample local workers, compose a
//! snapshot, publish it. Cadence is change-driven (a worker probe
//! result differs from the last published one) with a periodic floor
//! so monitors still see liveness during a quiet period.

use std::sync::Arc;
use std::time::Duration;

use jobmesh_core::{Clock, MachineSnapshot};
use jobmesh_store::Sss;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::probe::WorkerProbe;

// The persisted layout calls for a TTL on the machine-snapshot hash;
// the `Sss` trait has no expire primitive (worker presence faces the
// same gap, see jobmesh-broker), so staleness is instead read off
// `sampled_at` by consumers rather than enforced by the store.

const MACHINE_INDEX_KEY: &str = "index:machines";

fn machine_key(machine_id: &str) -> String {
    format!("machine:{machine_id}")
}

fn machine_channel(machine_id: &str) -> String {
    format!("channel:machine:{machine_id}:snapshot")
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub machine_id: String,
    pub heartbeat_interval: Duration,
    /// Upper bound on how long the loop goes without publishing, even
    /// if nothing changed.
    pub tick_floor: Duration,
    pub poll_interval: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            machine_id: String::new(),
            heartbeat_interval: Duration::from_secs(10),
            tick_floor: Duration::from_secs(15),
            poll_interval: Duration::from_secs(2),
        }
    }
}

pub struct Aggregator<S: Sss, C: Clock, P: WorkerProbe> {
    sss: Arc<S>,
    clock: C,
    probe: Arc<P>,
    config: AggregatorConfig,
    started_at_ms: i64,
    shutdown: CancellationToken,
}

impl<S: Sss, C: Clock, P: WorkerProbe> Aggregator<S, C, P> {
    pub fn new(sss: Arc<S>, clock: C, probe: Arc<P>, config: AggregatorConfig) -> Self {
        let started_at_ms = clock.epoch_ms();
        Self { sss, clock, probe, config, started_at_ms, shutdown: CancellationToken::new() }
    }

    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs until `shutdown_handle().cancel()` is called, then publishes
    /// a final `shutdown` snapshot before returning.
    pub async fn run(&self) {
        let mut last_published: Option<MachineSnapshot> = None;
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }

            let snapshot = self.compose_snapshot().await;
            let changed = last_published.as_ref().map(|prev| !snapshots_equivalent(prev, &snapshot)).unwrap_or(true);
            let stale = last_published
                .as_ref()
                .map(|prev| (snapshot.sampled_at - prev.sampled_at) as u64 >= self.config.tick_floor.as_millis() as u64)
                .unwrap_or(true);

            if changed || stale {
                self.publish(&snapshot).await;
                last_published = Some(snapshot);
            }
        }

        let shutdown_snapshot = MachineSnapshot::shutdown(&self.config.machine_id, self.uptime_secs(), self.clock.epoch_ms());
        self.publish(&shutdown_snapshot).await;
    }

    async fn compose_snapshot(&self) -> MachineSnapshot {
        let now_ms = self.clock.epoch_ms();
        let sample = self.probe.sample(&self.config.machine_id, now_ms, self.config.heartbeat_interval.as_millis() as i64).await;
        let status = MachineSnapshot::derive_status(&sample.services, !sample.workers.is_empty());
        MachineSnapshot {
            machine_id: self.config.machine_id.clone(),
            status,
            services: sample.services,
            workers: sample.workers,
            uptime_secs: self.uptime_secs(),
            sampled_at: now_ms,
        }
    }

    fn uptime_secs(&self) -> u64 {
        (self.clock.epoch_ms() - self.started_at_ms).max(0) as u64 / 1000
    }

    async fn publish(&self, snapshot: &MachineSnapshot) {
        let Ok(body) = serde_json::to_string(snapshot) else {
            error!(machine_id = %snapshot.machine_id, "failed to serialize machine snapshot");
            return;
        };
        let key = machine_key(&snapshot.machine_id);
        if let Err(e) = self.sss.hset(&key, "data", &body).await {
            warn!(error = %e, %key, "failed to persist machine snapshot");
        }
        if let Err(e) = self.sss.zadd(MACHINE_INDEX_KEY, &snapshot.machine_id, snapshot.sampled_at as f64).await {
            warn!(error = %e, machine_id = %snapshot.machine_id, "failed to index machine snapshot");
        }
        if let Err(e) = self.sss.publish(&machine_channel(&snapshot.machine_id), &body).await {
            warn!(error = %e, machine_id = %snapshot.machine_id, "failed to publish machine snapshot");
        }
    }
}

/// Equality that ignores `sampled_at`/`uptime_secs`, which always differ.
fn snapshots_equivalent(a: &MachineSnapshot, b: &MachineSnapshot) -> bool {
    a.status == b.status && a.services == b.services && a.workers == b.workers
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use jobmesh_core::{FakeClock, MachineStatus, ServiceHealth, WorkerSummary};
    use jobmesh_store::MemorySss;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedProbe {
        samples: Vec<crate::probe::WorkerSample>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WorkerProbe for ScriptedProbe {
        async fn sample(&self, _machine_id: &str, _now_ms: i64, _heartbeat_interval_ms: i64) -> crate::probe::WorkerSample {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst).min(self.samples.len() - 1);
            self.samples[idx].clone()
        }
    }

    fn sample_with(worker_status: &str) -> crate::probe::WorkerSample {
        let mut services = HashMap::new();
        services.insert("simulation".to_string(), ServiceHealth::Up);
        crate::probe::WorkerSample {
            workers: vec![WorkerSummary { worker_id: "wrk-1".into(), status: worker_status.into(), active_jobs: 0 }],
            services,
        }
    }

    #[tokio::test]
    async fn publishes_a_shutdown_snapshot_when_cancelled() {
        let sss = Arc::new(MemorySss::new());
        let clock = FakeClock::new();
        let probe = Arc::new(ScriptedProbe { samples: vec![sample_with("idle")], calls: AtomicUsize::new(0) });
        let config = AggregatorConfig { machine_id: "mch-1".into(), poll_interval: Duration::from_millis(1), ..Default::default() };
        let aggregator = Aggregator::new(sss.clone(), clock, probe, config);

        let shutdown = aggregator.shutdown_handle();
        shutdown.cancel();
        aggregator.run().await;

        let raw = sss.hget("machine:mch-1", "data").await.unwrap().unwrap();
        let snapshot: MachineSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(snapshot.status, MachineStatus::Shutdown);
    }

    #[tokio::test]
    async fn republishes_once_worker_state_changes() {
        let sss = Arc::new(MemorySss::new());
        let clock = FakeClock::new();
        let probe = Arc::new(ScriptedProbe {
            samples: vec![sample_with("idle"), sample_with("busy")],
            calls: AtomicUsize::new(0),
        });
        let config = AggregatorConfig {
            machine_id: "mch-1".into(),
            poll_interval: Duration::from_millis(1),
            tick_floor: Duration::from_secs(3600),
            ..Default::default()
        };
        let aggregator = Aggregator::new(sss.clone(), clock, probe, config);
        let shutdown = aggregator.shutdown_handle();

        tokio::spawn({
            let shutdown = shutdown.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                shutdown.cancel();
            }
        });
        aggregator.run().await;

        let raw = sss.hget("machine:mch-1", "data").await.unwrap().unwrap();
        let snapshot: MachineSnapshot = serde_json::from_str(&raw).unwrap();
        assert_eq!(snapshot.status, MachineStatus::Shutdown);
    }
}
