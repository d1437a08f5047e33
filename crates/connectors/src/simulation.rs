// SPDX-License-Identifier: MIT

//! A deterministic fake backend for tests and local development. Sleeps
//! a configured duration per declared step, reporting progress along
//! the way, and never errors unless explicitly configured to.

use async_trait::async_trait;
use jobmesh_core::Job;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::connector::{Connector, ConnectorCapabilities, ProgressSink};
use crate::error::{ConnectorError, ConnectorResult};

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub service_tag: String,
    pub step_count: u32,
    pub step_duration: Duration,
    /// If set, `process` fails on this step with this message instead of
    /// completing.
    pub fail_on_step: Option<(u32, String)>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            service_tag: "simulation".into(),
            step_count: 4,
            step_duration: Duration::from_millis(10),
            fail_on_step: None,
        }
    }
}

pub struct SimulationConnector {
    config: SimulationConfig,
}

impl SimulationConnector {
    pub fn new(config: SimulationConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector for SimulationConnector {
    async fn initialize(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn cleanup(&self) -> ConnectorResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> ConnectorResult<()> {
        Ok(())
    }

    fn can_process(&self, job: &Job) -> bool {
        job.service_required == self.config.service_tag
    }

    fn capabilities(&self) -> ConnectorCapabilities {
        ConnectorCapabilities { service_tag: self.config.service_tag.clone(), max_concurrent: 64 }
    }

    async fn process(
        &self,
        job: &Job,
        sink: &dyn ProgressSink,
        cancel: CancellationToken,
    ) -> ConnectorResult<serde_json::Value> {
        let total = self.config.step_count.max(1);
        for step in 1..=total {
            if cancel.is_cancelled() {
                return Err(ConnectorError::Cancelled);
            }
            if let Some((fail_step, message)) = &self.config.fail_on_step {
                if step == *fail_step {
                    return Err(ConnectorError::Rejected(message.clone()));
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.step_duration) => {}
                _ = cancel.cancelled() => return Err(ConnectorError::Cancelled),
            }
            let pct = (step as f64 / total as f64) * 100.0;
            sink.report(pct, &format!("step {step}/{total}"), step, total, None).await;
        }
        Ok(serde_json::json!({ "echo": job.payload, "steps_run": total }))
    }

    async fn cancel(&self, _service_job_id: &str) -> ConnectorResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobmesh_core::test_support::JobFixture;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingSink(Arc<AtomicU32>);

    #[async_trait]
    impl ProgressSink for CountingSink {
        async fn report(&self, _: f64, _: &str, _: u32, _: u32, _: Option<i64>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn completes_and_reports_one_frame_per_step() {
        let connector = SimulationConnector::new(SimulationConfig {
            step_count: 3,
            step_duration: Duration::from_millis(1),
            ..Default::default()
        });
        let job = JobFixture::default().service_required("simulation").build();
        let count = Arc::new(AtomicU32::new(0));
        let sink = CountingSink(count.clone());
        let result = connector.process(&job, &sink, CancellationToken::new()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(result["steps_run"], 3);
    }

    #[tokio::test]
    async fn configured_failure_step_returns_rejected() {
        let connector = SimulationConnector::new(SimulationConfig {
            step_count: 3,
            step_duration: Duration::from_millis(1),
            fail_on_step: Some((2, "boom".into())),
            ..Default::default()
        });
        let job = JobFixture::default().service_required("simulation").build();
        let err = connector.process(&job, &NullSink, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Rejected(_)));
    }

    #[tokio::test]
    async fn cancellation_stops_processing_early() {
        let connector = SimulationConnector::new(SimulationConfig {
            step_count: 10,
            step_duration: Duration::from_millis(50),
            ..Default::default()
        });
        let job = JobFixture::default().service_required("simulation").build();
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            cancel_clone.cancel();
        });
        let err = connector.process(&job, &NullSink, cancel).await.unwrap_err();
        assert!(matches!(err, ConnectorError::Cancelled));
    }

    struct NullSink;
    #[async_trait]
    impl ProgressSink for NullSink {
        async fn report(&self, _: f64, _: &str, _: u32, _: u32, _: Option<i64>) {}
    }
}
