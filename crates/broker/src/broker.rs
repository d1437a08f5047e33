// SPDX-License-Identifier: MIT

//! The Job Broker: the only component allowed to write job/worker
//! records to the Shared State Store. Connection Manager and Message
//! Handler express intent ("this worker wants a job", "this job
//! completed"); the Broker is where that intent becomes a state
//! transition, persisted and published.

use jobmesh_core::{
    Clock, DomainError, Job, JobRequirements, JobStatus, ProgressFrame, WorkerCapabilities, WorkerRecord,
};
use jobmesh_store::{claim_next_cas, Sss};
use serde_json::Value;

use crate::error::{BrokerError, BrokerResult};
use crate::retry::{with_retry, RetryPolicy};
use crate::stats::BrokerStats;

const PENDING_QUEUE_KEY: &str = "queue:pending";
const JOB_INDEX_KEY: &str = "index:jobs";
const WORKER_INDEX_KEY: &str = "index:workers";
const JOBS_CHANNEL: &str = "channel:jobs_available";
const PROGRESS_STREAM_PREFIX: &str = "progress:";

fn job_key(job_id: &str) -> String {
    format!("job:{job_id}")
}

fn worker_key(worker_id: &str) -> String {
    format!("worker:{worker_id}")
}

#[derive(Debug, Clone, Default)]
pub struct SubmitJobRequest {
    pub service_required: String,
    pub priority: i32,
    pub payload: Value,
    pub requirements: JobRequirements,
    pub customer_id: Option<String>,
    pub max_retries: i32,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub customer_id: Option<String>,
}

impl JobFilter {
    fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        if let Some(customer) = &self.customer_id {
            if job.customer_id.as_deref() != Some(customer.as_str()) {
                return false;
            }
        }
        true
    }
}

pub struct Broker<S: Sss, C: Clock> {
    sss: S,
    clock: C,
    retry_policy: RetryPolicy,
    scan_limit: usize,
    matcher_max_attempts: u32,
    submission_seq_key: std::sync::atomic::AtomicU64,
}

impl<S: Sss, C: Clock> Broker<S, C> {
    pub fn new(sss: S, clock: C) -> Self {
        Self {
            sss,
            clock,
            retry_policy: RetryPolicy::default(),
            scan_limit: jobmesh_store::matcher::DEFAULT_SCAN_LIMIT,
            matcher_max_attempts: jobmesh_store::matcher::DEFAULT_MAX_ATTEMPTS,
            submission_seq_key: std::sync::atomic::AtomicU64::new(0),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    async fn load_job(&self, job_id: &str) -> BrokerResult<Job> {
        let raw = with_retry(&self.retry_policy, || self.sss.hget(&job_key(job_id), "data")).await?;
        let raw = raw.ok_or_else(|| BrokerError::JobNotFound(job_id.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| BrokerError::CorruptRecord(e.to_string()))
    }

    async fn store_job(&self, job: &Job) -> BrokerResult<()> {
        let encoded = serde_json::to_string(job).map_err(|e| BrokerError::CorruptRecord(e.to_string()))?;
        with_retry(&self.retry_policy, || self.sss.hset(&job_key(&job.id.to_string()), "data", &encoded)).await?;
        Ok(())
    }

    pub async fn submit_job(&self, request: SubmitJobRequest) -> BrokerResult<String> {
        if request.service_required.trim().is_empty() {
            return Err(BrokerError::InvalidJob(jobmesh_core::InvalidJob::MissingServiceRequired));
        }
        if !(0..=100).contains(&request.priority) {
            return Err(BrokerError::InvalidJob(jobmesh_core::InvalidJob::PriorityOutOfRange(request.priority)));
        }
        let seq = self.submission_seq_key.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut job = Job::new(
            jobmesh_core::JobId::new(),
            request.service_required,
            request.priority,
            request.payload,
            request.requirements,
            request.customer_id,
            request.max_retries,
            seq,
            &self.clock,
        );
        job.commit_to_queue().map_err(BrokerError::Domain)?;

        self.store_job(&job).await?;
        with_retry(&self.retry_policy, || {
            self.sss.zadd(PENDING_QUEUE_KEY, &job.id.to_string(), job.queue_score() as f64)
        })
        .await?;
        with_retry(&self.retry_policy, || {
            self.sss.zadd(JOB_INDEX_KEY, &job.id.to_string(), job.created_at as f64)
        })
        .await?;
        with_retry(&self.retry_policy, || self.sss.publish(JOBS_CHANNEL, &job.service_required)).await?;

        Ok(job.id.to_string())
    }

    pub async fn claim_next(&self, worker_id: &str, capabilities: &WorkerCapabilities) -> BrokerResult<Option<Job>> {
        match claim_next_cas(&self.sss, worker_id, capabilities, &self.clock, self.scan_limit, self.matcher_max_attempts)
            .await
        {
            Ok(job) => Ok(job),
            Err(jobmesh_store::StoreError::MatcherContention { .. }) => Ok(None),
            Err(e) => Err(BrokerError::Store(e)),
        }
    }

    /// Release a job back to the queue after a worker failure,
    /// transitioning it to `failed` instead if the retry budget is
    /// exhausted. Returns `true` if requeued, `false` if now terminal.
    pub async fn release(&self, job_id: &str, failed_worker: &str) -> BrokerResult<bool> {
        let mut job = self.load_job(job_id).await?;
        let requeued = job.release_for_retry(failed_worker, self.clock.epoch_ms()).map_err(BrokerError::Domain)?;
        self.store_job(&job).await?;
        if requeued {
            with_retry(&self.retry_policy, || {
                self.sss.zadd(PENDING_QUEUE_KEY, &job.id.to_string(), job.queue_score() as f64)
            })
            .await?;
        } else {
            with_retry(&self.retry_policy, || self.sss.zrem(PENDING_QUEUE_KEY, &job.id.to_string())).await?;
        }
        Ok(requeued)
    }

    /// Persist the external service's own id for this job, set by a
    /// connector before it starts blocking on that service. Lets crash
    /// recovery query the downstream service directly by this id
    /// instead of losing track of in-flight work.
    pub async fn set_service_job_id(&self, job_id: &str, service_job_id: &str) -> BrokerResult<()> {
        let mut job = self.load_job(job_id).await?;
        job.service_job_id = Some(service_job_id.to_string());
        self.store_job(&job).await
    }

    pub async fn update_progress(&self, job_id: &str, frame: &ProgressFrame) -> BrokerResult<()> {
        let _ = self.load_job(job_id).await?; // 404s if the job doesn't exist
        let encoded = serde_json::to_string(frame).map_err(|e| BrokerError::CorruptRecord(e.to_string()))?;
        let stream_key = format!("{PROGRESS_STREAM_PREFIX}{job_id}");
        with_retry(&self.retry_policy, || self.sss.xadd(&stream_key, &[("data", encoded.as_str())])).await?;
        Ok(())
    }

    pub async fn complete(&self, job_id: &str, result: Value) -> BrokerResult<()> {
        let mut job = self.load_job(job_id).await?;
        let worker_id = job.worker_id.clone();
        job.complete(result, self.clock.epoch_ms()).map_err(BrokerError::Domain)?;
        self.store_job(&job).await?;
        if let Some(worker_id) = worker_id {
            self.bump_worker_counter(&worker_id, true).await?;
        }
        Ok(())
    }

    /// `can_retry` mirrors the worker's own assessment; the broker
    /// still enforces the retry budget regardless of what the worker
    /// claims.
    pub async fn fail(&self, job_id: &str, error: impl Into<String>, can_retry: bool) -> BrokerResult<bool> {
        let error = error.into();
        if !can_retry {
            let mut job = self.load_job(job_id).await?;
            let worker_id = job.worker_id.clone();
            job.fail_terminal(error, self.clock.epoch_ms()).map_err(BrokerError::Domain)?;
            self.store_job(&job).await?;
            with_retry(&self.retry_policy, || self.sss.zrem(PENDING_QUEUE_KEY, &job.id.to_string())).await?;
            if let Some(worker_id) = worker_id {
                self.bump_worker_counter(&worker_id, false).await?;
            }
            return Ok(false);
        }
        let worker_id = self.load_job(job_id).await?.worker_id.clone().unwrap_or_default();
        let requeued = self.release(job_id, &worker_id).await?;
        if !requeued && !worker_id.is_empty() {
            self.bump_worker_counter(&worker_id, false).await?;
        }
        Ok(requeued)
    }

    pub async fn cancel(&self, job_id: &str, reason: Option<String>) -> BrokerResult<Option<String>> {
        let mut job = self.load_job(job_id).await?;
        let worker_id = job.worker_id.clone();
        job.cancel(reason, self.clock.epoch_ms()).map_err(BrokerError::Domain)?;
        self.store_job(&job).await?;
        with_retry(&self.retry_policy, || self.sss.zrem(PENDING_QUEUE_KEY, &job.id.to_string())).await?;
        Ok(worker_id)
    }

    /// Release any job owned by a worker whose heartbeat has expired,
    /// or whose worker record is gone entirely. Returns the count
    /// released.
    pub async fn detect_orphans(&self, heartbeat_timeout_ms: i64) -> BrokerResult<u32> {
        let now = self.clock.epoch_ms();
        let job_ids = with_retry(&self.retry_policy, || self.sss.zrangebyscore(JOB_INDEX_KEY, f64::MIN, f64::MAX)).await?;
        let mut released = 0u32;
        for scored in job_ids {
            let job = match self.load_job(&scored.member).await {
                Ok(job) => job,
                Err(_) => continue,
            };
            if !job.status.is_owned_by_worker() {
                continue;
            }
            let Some(worker_id) = job.worker_id.clone() else { continue };
            let orphaned = match self.load_worker(&worker_id).await {
                Ok(Some(record)) => record.is_expired(now, heartbeat_timeout_ms / 2),
                Ok(None) => true,
                Err(_) => true,
            };
            if orphaned && self.release(&scored.member, &worker_id).await.is_ok() {
                released += 1;
            }
        }
        Ok(released)
    }

    pub async fn queue_position(&self, job_id: &str) -> BrokerResult<i64> {
        let job = self.load_job(job_id).await?;
        if job.status != JobStatus::Queued {
            return Ok(-1);
        }
        let rank = with_retry(&self.retry_policy, || self.sss.zrevrank(PENDING_QUEUE_KEY, job_id)).await?;
        Ok(rank.map(|r| r as i64).unwrap_or(-1))
    }

    pub async fn get_job(&self, job_id: &str) -> BrokerResult<Option<Job>> {
        match self.load_job(job_id).await {
            Ok(job) => Ok(Some(job)),
            Err(BrokerError::JobNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn list_jobs(&self, filter: &JobFilter, limit: usize, offset: usize) -> BrokerResult<Vec<Job>> {
        let ids = with_retry(&self.retry_policy, || self.sss.zrangebyscore(JOB_INDEX_KEY, f64::MIN, f64::MAX)).await?;
        let mut jobs = Vec::new();
        for scored in ids {
            if let Ok(job) = self.load_job(&scored.member).await {
                if filter.matches(&job) {
                    jobs.push(job);
                }
            }
        }
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs.into_iter().skip(offset).take(limit).collect())
    }

    pub async fn stats(&self) -> BrokerResult<BrokerStats> {
        let jobs = self.list_jobs(&JobFilter::default(), usize::MAX, 0).await?;
        let mut stats = BrokerStats::default();
        for job in jobs {
            match job.status {
                JobStatus::Pending | JobStatus::Queued => stats.pending += 1,
                JobStatus::Assigned | JobStatus::Accepted => stats.assigned += 1,
                JobStatus::InProgress => stats.in_progress += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed | JobStatus::Timeout => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    pub async fn register_worker(&self, record: &WorkerRecord) -> BrokerResult<()> {
        let encoded = serde_json::to_string(record).map_err(|e| BrokerError::CorruptRecord(e.to_string()))?;
        with_retry(&self.retry_policy, || self.sss.hset(&worker_key(&record.worker_id), "data", &encoded)).await?;
        with_retry(&self.retry_policy, || {
            self.sss.zadd(WORKER_INDEX_KEY, &record.worker_id, record.connected_at as f64)
        })
        .await?;
        Ok(())
    }

    pub async fn heartbeat(&self, worker_id: &str) -> BrokerResult<()> {
        let mut record = self.load_worker(worker_id).await?.ok_or_else(|| BrokerError::WorkerNotFound(worker_id.to_string()))?;
        record.touch_heartbeat(self.clock.epoch_ms());
        let encoded = serde_json::to_string(&record).map_err(|e| BrokerError::CorruptRecord(e.to_string()))?;
        with_retry(&self.retry_policy, || self.sss.hset(&worker_key(worker_id), "data", &encoded)).await?;
        Ok(())
    }

    pub async fn list_workers(&self) -> BrokerResult<Vec<WorkerRecord>> {
        let ids = with_retry(&self.retry_policy, || self.sss.zrangebyscore(WORKER_INDEX_KEY, f64::MIN, f64::MAX)).await?;
        let mut workers = Vec::new();
        for scored in ids {
            if let Some(record) = self.load_worker(&scored.member).await? {
                workers.push(record);
            }
        }
        workers.sort_by_key(|w| w.connected_at);
        Ok(workers)
    }

    pub async fn load_worker(&self, worker_id: &str) -> BrokerResult<Option<WorkerRecord>> {
        let raw = with_retry(&self.retry_policy, || self.sss.hget(&worker_key(worker_id), "data")).await?;
        match raw {
            None => Ok(None),
            Some(raw) => {
                serde_json::from_str(&raw).map(Some).map_err(|e| BrokerError::CorruptRecord(e.to_string()))
            }
        }
    }

    async fn bump_worker_counter(&self, worker_id: &str, success: bool) -> BrokerResult<()> {
        if let Some(mut record) = self.load_worker(worker_id).await? {
            if success {
                record.jobs_completed += 1;
            } else {
                record.jobs_failed += 1;
            }
            let encoded = serde_json::to_string(&record).map_err(|e| BrokerError::CorruptRecord(e.to_string()))?;
            with_retry(&self.retry_policy, || self.sss.hset(&worker_key(worker_id), "data", &encoded)).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobmesh_core::FakeClock;
    use jobmesh_store::MemorySss;
    use std::collections::HashSet;

    fn broker() -> Broker<MemorySss, FakeClock> {
        Broker::new(MemorySss::new(), FakeClock::new())
    }

    fn caps(service: &str) -> WorkerCapabilities {
        WorkerCapabilities {
            service_tags: HashSet::from([service.to_string()]),
            gpu_memory_gb: 24.0,
            ram_gb: 64.0,
            cpu_cores: 16,
            gpu_count: 1,
            max_concurrent_jobs: 4,
            ..Default::default()
        }
    }

    fn submit_request() -> SubmitJobRequest {
        SubmitJobRequest {
            service_required: "simulation".into(),
            priority: 50,
            payload: serde_json::json!({}),
            requirements: JobRequirements::default(),
            customer_id: None,
            max_retries: 2,
        }
    }

    #[tokio::test]
    async fn submit_then_claim_assigns_to_the_worker() {
        let broker = broker();
        let job_id = broker.submit_job(submit_request()).await.unwrap();
        let claimed = broker.claim_next("wrk-1", &caps("simulation")).await.unwrap().expect("a match");
        assert_eq!(claimed.id.to_string(), job_id);
        assert_eq!(claimed.worker_id.as_deref(), Some("wrk-1"));
        assert_eq!(broker.queue_position(&job_id).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn rejects_submission_with_blank_service() {
        let broker = broker();
        let mut req = submit_request();
        req.service_required = "  ".into();
        let err = broker.submit_job(req).await.unwrap_err();
        assert!(matches!(err, BrokerError::InvalidJob(_)));
    }

    #[tokio::test]
    async fn list_workers_returns_every_registered_worker_oldest_first() {
        let clock = FakeClock::new();
        let broker = Broker::new(MemorySss::new(), clock.clone());
        let w1 = WorkerRecord::new("wrk-a", "mch-1", caps("simulation"), "1.0.0", 100);
        let w2 = WorkerRecord::new("wrk-b", "mch-1", caps("simulation"), "1.0.0", 50);
        broker.register_worker(&w1).await.unwrap();
        broker.register_worker(&w2).await.unwrap();

        let workers = broker.list_workers().await.unwrap();
        let ids: Vec<&str> = workers.iter().map(|w| w.worker_id.as_str()).collect();
        assert_eq!(ids, vec!["wrk-b", "wrk-a"]);
    }

    #[tokio::test]
    async fn progress_then_complete_happy_path() {
        let broker = broker();
        let job_id = broker.submit_job(submit_request()).await.unwrap();
        broker.claim_next("wrk-1", &caps("simulation")).await.unwrap().unwrap();
        broker
            .update_progress(&job_id, &ProgressFrame::new(job_id.clone(), "wrk-1", 50.0, "halfway", 5, 10, None, 1))
            .await
            .unwrap();
        broker.complete(&job_id, serde_json::json!({"ok": true})).await.unwrap();
        let job = broker.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn set_service_job_id_persists_on_the_job_record() {
        let broker = broker();
        let job_id = broker.submit_job(submit_request()).await.unwrap();
        broker.claim_next("wrk-1", &caps("simulation")).await.unwrap().unwrap();
        broker.set_service_job_id(&job_id, "prompt-abc123").await.unwrap();
        let job = broker.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.service_job_id.as_deref(), Some("prompt-abc123"));
    }

    #[tokio::test]
    async fn complete_is_idempotent_on_duplicate_calls() {
        let broker = broker();
        let job_id = broker.submit_job(submit_request()).await.unwrap();
        broker.claim_next("wrk-1", &caps("simulation")).await.unwrap().unwrap();
        broker.complete(&job_id, serde_json::json!({"n": 1})).await.unwrap();
        broker.complete(&job_id, serde_json::json!({"n": 2})).await.unwrap();
        let job = broker.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn fail_with_retry_requeues_until_budget_exhausted() {
        let broker = broker();
        let job_id = broker.submit_job(submit_request()).await.unwrap();
        for _ in 0..2 {
            broker.claim_next("wrk-1", &caps("simulation")).await.unwrap().unwrap();
            let requeued = broker.fail(&job_id, "transient", true).await.unwrap();
            assert!(requeued);
        }
        broker.claim_next("wrk-1", &caps("simulation")).await.unwrap().unwrap();
        let requeued = broker.fail(&job_id, "final", true).await.unwrap();
        assert!(!requeued);
        let job = broker.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn cancel_removes_job_from_pending_queue() {
        let broker = broker();
        let job_id = broker.submit_job(submit_request()).await.unwrap();
        broker.cancel(&job_id, Some("operator request".into())).await.unwrap();
        let job = broker.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(broker.queue_position(&job_id).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn detect_orphans_releases_jobs_of_vanished_workers() {
        let broker = broker();
        let job_id = broker.submit_job(submit_request()).await.unwrap();
        broker.claim_next("wrk-ghost", &caps("simulation")).await.unwrap().unwrap();
        // no worker record was ever registered for "wrk-ghost"
        let released = broker.detect_orphans(5_000).await.unwrap();
        assert_eq!(released, 1);
        let job = broker.get_job(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn stats_reflects_queue_composition() {
        let broker = broker();
        broker.submit_job(submit_request()).await.unwrap();
        broker.submit_job(submit_request()).await.unwrap();
        let job_id = broker.submit_job(submit_request()).await.unwrap();
        broker.claim_next("wrk-1", &caps("simulation")).await.unwrap().unwrap();
        broker.complete(&job_id, serde_json::json!({})).await.unwrap();

        let stats = broker.stats().await.unwrap();
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.completed, 1);
    }
}
