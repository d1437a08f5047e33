// SPDX-License-Identifier: MIT

//! The worker pull loop: claim a job when under budget, run it through
//! a connector, stream progress, report the outcome, and drain
//! gracefully on shutdown. Dependencies ([`BrokerClient`], [`Clock`],
//! [`ConnectorRegistry`]) are injected so the loop is testable with
//! fakes, mirroring the teacher's `RuntimeDeps`/`RuntimeConfig` split.

use jobmesh_connectors::{Connector, ConnectorRegistry, ProgressSink};
use jobmesh_core::{Clock, Job, ProgressFrame, WorkerCapabilities};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::transport::BrokerClient;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub worker_id: String,
    pub machine_id: String,
    pub version: String,
    pub max_concurrent_jobs: u32,
    pub heartbeat_interval: Duration,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub drain_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_id: "wrk-unnamed".into(),
            machine_id: "mch-unnamed".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            max_concurrent_jobs: 1,
            heartbeat_interval: Duration::from_secs(10),
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(30),
        }
    }
}

struct InFlightSink<T: BrokerClient, C: Clock> {
    transport: Arc<T>,
    clock: C,
    job_id: String,
    worker_id: String,
}

#[async_trait::async_trait]
impl<T: BrokerClient, C: Clock> ProgressSink for InFlightSink<T, C> {
    async fn report(
        &self,
        progress_pct: f64,
        message: &str,
        current_step: u32,
        total_steps: u32,
        estimated_completion_ms: Option<i64>,
    ) {
        let frame = ProgressFrame::new(
            self.job_id.clone(),
            self.worker_id.clone(),
            progress_pct,
            message,
            current_step,
            total_steps,
            estimated_completion_ms,
            self.clock.epoch_ms(),
        );
        if let Err(e) = self.transport.report_progress(&frame).await {
            warn!(job_id = %self.job_id, error = %e, "failed to report progress");
        }
    }

    async fn set_service_job_id(&self, service_job_id: &str) {
        if let Err(e) = self.transport.set_service_job_id(&self.job_id, service_job_id).await {
            warn!(job_id = %self.job_id, error = %e, "failed to persist service_job_id");
        }
    }
}

pub struct Runtime<T: BrokerClient, C: Clock> {
    transport: Arc<T>,
    clock: C,
    registry: Arc<ConnectorRegistry>,
    capabilities: WorkerCapabilities,
    config: RuntimeConfig,
    in_flight_count: Arc<AtomicUsize>,
    in_flight_cancel: Arc<Mutex<HashMap<String, CancellationToken>>>,
    shutdown: CancellationToken,
}

impl<T: BrokerClient + 'static, C: Clock + 'static> Runtime<T, C> {
    pub fn new(
        transport: Arc<T>,
        clock: C,
        registry: Arc<ConnectorRegistry>,
        capabilities: WorkerCapabilities,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            transport,
            clock,
            registry,
            capabilities,
            config,
            in_flight_count: Arc::new(AtomicUsize::new(0)),
            in_flight_cancel: Arc::new(Mutex::new(HashMap::new())),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn shutdown_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn register(&self) -> Result<(), crate::transport::TransportError> {
        self.transport
            .register(&self.config.worker_id, &self.config.machine_id, &self.capabilities, &self.config.version)
            .await
    }

    /// Runs the pull loop, heartbeat task, and cancel-notice dispatcher
    /// concurrently until `shutdown_handle()` is triggered, then drains.
    pub async fn run(self: Arc<Self>) {
        let heartbeat = tokio::spawn(self.clone().heartbeat_loop());
        let cancel_watch = tokio::spawn(self.clone().cancel_dispatch_loop());
        self.clone().pull_loop().await;

        self.drain().await;
        heartbeat.abort();
        cancel_watch.abort();
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.heartbeat_interval) => {
                    let info = serde_json::json!({ "in_flight": self.in_flight_count.load(Ordering::SeqCst) });
                    if let Err(e) = self.transport.heartbeat(&self.config.worker_id, info).await {
                        warn!(error = %e, "heartbeat failed");
                    }
                }
                _ = self.shutdown.cancelled() => return,
            }
        }
    }

    async fn cancel_dispatch_loop(self: Arc<Self>) {
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            match self.transport.poll_cancel().await {
                Some(notice) => {
                    if let Some(token) = self.in_flight_cancel.lock().get(&notice.job_id) {
                        token.cancel();
                    }
                }
                None => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    }

    async fn pull_loop(self: Arc<Self>) {
        let mut backoff = self.config.min_backoff;
        loop {
            if self.shutdown.is_cancelled() {
                return;
            }
            if self.in_flight_count.load(Ordering::SeqCst) as u32 >= self.config.max_concurrent_jobs.max(1) {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(20)) => {}
                    _ = self.shutdown.cancelled() => return,
                }
                continue;
            }

            match self.transport.claim_next(&self.config.worker_id, &self.capabilities).await {
                Ok(Some(job)) => {
                    backoff = self.config.min_backoff;
                    self.in_flight_count.fetch_add(1, Ordering::SeqCst);
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.clone().run_job(job).await;
                        this.in_flight_count.fetch_sub(1, Ordering::SeqCst);
                    });
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(jittered(backoff)) => {}
                        _ = self.shutdown.cancelled() => return,
                    }
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
                Err(e) => {
                    warn!(error = %e, "claim_next failed, backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(jittered(backoff)) => {}
                        _ = self.shutdown.cancelled() => return,
                    }
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
            }
        }
    }

    async fn run_job(self: Arc<Self>, job: Job) {
        let job_id = job.id.to_string();
        let Some(connector) = self.registry.get(&job.service_required) else {
            warn!(job_id, service = %job.service_required, "no connector registered for service");
            let _ = self.transport.fail(&job_id, "no connector for service", false).await;
            return;
        };

        let cancel = CancellationToken::new();
        self.in_flight_cancel.lock().insert(job_id.clone(), cancel.clone());
        let sink = InFlightSink {
            transport: self.transport.clone(),
            clock: self.clock.clone(),
            job_id: job_id.clone(),
            worker_id: self.config.worker_id.clone(),
        };

        let outcome = connector.process(&job, &sink, cancel).await;
        self.in_flight_cancel.lock().remove(&job_id);

        match outcome {
            Ok(result) => {
                info!(job_id, "job completed");
                let _ = self.transport.complete(&job_id, result).await;
            }
            Err(jobmesh_connectors::ConnectorError::Cancelled) if self.shutdown.is_cancelled() => {
                // Drain already released this job; nothing further to report.
            }
            Err(e) => {
                let retryable = e.is_retryable();
                warn!(job_id, error = %e, retryable, "job failed");
                let _ = self.transport.fail(&job_id, &e.to_string(), retryable).await;
            }
        }
    }

    /// Stop claiming, wait for in-flight jobs to finish up to the drain
    /// timeout, then release anything still running.
    async fn drain(&self) {
        let wait_for_idle = async {
            while self.in_flight_count.load(Ordering::SeqCst) > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        };
        let _ = tokio::time::timeout(self.config.drain_timeout, wait_for_idle).await;

        let remaining: Vec<String> = self.in_flight_cancel.lock().keys().cloned().collect();
        for job_id in remaining {
            if let Some(token) = self.in_flight_cancel.lock().get(&job_id) {
                token.cancel();
            }
            let _ = self.transport.release(&job_id, &self.config.worker_id).await;
        }
    }
}

fn jittered(base: Duration) -> Duration {
    let jitter_ms = rand::thread_rng().gen_range(0..=(base.as_millis() as u64 / 4).max(1));
    base + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_transport::FakeTransport;
    use jobmesh_connectors::{SimulationConfig, SimulationConnector};
    use jobmesh_core::{test_support::JobFixture, FakeClock};
    use std::time::Duration as StdDuration;

    fn registry(step_duration: StdDuration) -> Arc<ConnectorRegistry> {
        let mut registry = ConnectorRegistry::new();
        registry.register(Arc::new(SimulationConnector::new(SimulationConfig {
            service_tag: "simulation".into(),
            step_count: 2,
            step_duration,
            ..Default::default()
        })));
        Arc::new(registry)
    }

    fn test_config() -> RuntimeConfig {
        RuntimeConfig {
            worker_id: "wrk-test".into(),
            machine_id: "mch-test".into(),
            max_concurrent_jobs: 1,
            heartbeat_interval: StdDuration::from_secs(60),
            min_backoff: StdDuration::from_millis(1),
            max_backoff: StdDuration::from_millis(4),
            drain_timeout: StdDuration::from_millis(200),
            ..RuntimeConfig::default()
        }
    }

    fn caps() -> WorkerCapabilities {
        WorkerCapabilities { service_tags: ["simulation".to_string()].into(), ..Default::default() }
    }

    #[tokio::test]
    async fn claims_and_completes_a_job_then_shuts_down() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_job(JobFixture::default().service_required("simulation").build());

        let runtime = Arc::new(Runtime::new(
            transport.clone(),
            FakeClock::new(),
            registry(StdDuration::from_millis(1)),
            caps(),
            test_config(),
        ));
        let shutdown = runtime.shutdown_handle();

        let handle = tokio::spawn(runtime.run());
        // Give the pull loop a moment to claim and finish the one job,
        // then ask it to stop — nothing should be left in flight to drain.
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(transport.completions.lock().len(), 1);
        assert!(transport.failures.lock().is_empty());
    }

    #[tokio::test]
    async fn connector_service_job_id_is_persisted_through_the_transport() {
        let transport = Arc::new(FakeTransport::new());
        let job = JobFixture::default().service_required("simulation").build();
        let job_id = job.id.to_string();
        transport.push_job(job);

        let runtime = Arc::new(Runtime::new(
            transport.clone(),
            FakeClock::new(),
            registry(StdDuration::from_millis(1)),
            caps(),
            test_config(),
        ));
        let shutdown = runtime.shutdown_handle();
        let handle = tokio::spawn(runtime.run());
        tokio::time::sleep(StdDuration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap();

        // SimulationConnector doesn't call set_service_job_id itself, so
        // this exercises the sink -> transport wiring directly.
        let sink = InFlightSink { transport: transport.clone(), clock: FakeClock::new(), job_id: job_id.clone(), worker_id: "wrk-test".into() };
        sink.set_service_job_id("svc-xyz").await;
        assert_eq!(transport.service_job_ids.lock().as_slice(), &[(job_id, "svc-xyz".to_string())]);
    }

    #[tokio::test]
    async fn respects_concurrency_budget() {
        let transport = Arc::new(FakeTransport::new());
        for _ in 0..3 {
            transport.push_job(JobFixture::default().service_required("simulation").build());
        }

        let mut config = test_config();
        config.max_concurrent_jobs = 1;
        let runtime = Arc::new(Runtime::new(
            transport.clone(),
            FakeClock::new(),
            registry(StdDuration::from_millis(20)),
            caps(),
            config,
        ));
        let shutdown = runtime.shutdown_handle();
        let handle = tokio::spawn(runtime.run());

        tokio::time::sleep(StdDuration::from_millis(15)).await;
        // Budget of 1 means at most one job should have completed this early.
        assert!(transport.completions.lock().len() <= 1);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_releases_a_still_running_job() {
        let transport = Arc::new(FakeTransport::new());
        transport.push_job(JobFixture::default().service_required("simulation").build());

        let mut config = test_config();
        config.drain_timeout = StdDuration::from_millis(5);
        let runtime = Arc::new(Runtime::new(
            transport.clone(),
            FakeClock::new(),
            registry(StdDuration::from_secs(10)), // long-running job, never finishes in time
            caps(),
            config,
        ));
        let shutdown = runtime.shutdown_handle();
        let handle = tokio::spawn(runtime.run());

        tokio::time::sleep(StdDuration::from_millis(20)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert_eq!(transport.releases.lock().len(), 1);
        assert!(transport.completions.lock().is_empty());
    }
}
