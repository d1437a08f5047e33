// SPDX-License-Identifier: MIT

//! Job domain model and state machine.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::clock::Clock;
use crate::error::{DomainError, DomainResult};
use crate::ids::JobId;

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Queued,
    Assigned,
    Accepted,
    InProgress,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Queued => "queued",
        Assigned => "assigned",
        Accepted => "accepted",
        InProgress => "in_progress",
        Completed => "completed",
        Failed => "failed",
        Timeout => "timeout",
        Cancelled => "cancelled",
    }
}

impl JobStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout | JobStatus::Cancelled)
    }

    pub fn is_owned_by_worker(self) -> bool {
        matches!(self, JobStatus::Assigned | JobStatus::Accepted | JobStatus::InProgress)
    }
}

/// Customer-isolation policy for capability matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerIsolation {
    Strict,
    Loose,
    None,
}

/// Hardware lower bounds a job may require.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HardwareRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_memory_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_cores: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_count: Option<u32>,
}

/// Optional constraints narrowing which workers may claim a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequirements {
    #[serde(default)]
    pub hardware: HardwareRequirements,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workflows: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_isolation: Option<CustomerIsolation>,
}

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub service_required: String,
    pub priority: i32,
    pub payload: serde_json::Value,
    #[serde(default)]
    pub requirements: JobRequirements,
    pub customer_id: Option<String>,
    pub workflow_id: Option<String>,
    pub workflow_priority: Option<i32>,
    pub workflow_datetime: Option<i64>,
    pub step_number: Option<u32>,
    pub max_retries: i32,
    pub retry_count: i32,
    pub created_at: i64,
    pub assigned_at: Option<i64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub failed_at: Option<i64>,
    pub worker_id: Option<String>,
    pub last_failed_worker: Option<String>,
    pub service_job_id: Option<String>,
    pub status: JobStatus,
    /// Monotonic submission counter, used as the secondary sort key for
    /// same-priority jobs (FIFO tie-break).
    pub submission_seq: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    /// Construct a new job in `Pending`, about to be committed to `Queued`
    /// by the broker.
    pub fn new(
        id: JobId,
        service_required: impl Into<String>,
        priority: i32,
        payload: serde_json::Value,
        requirements: JobRequirements,
        customer_id: Option<String>,
        max_retries: i32,
        submission_seq: u64,
        clock: &impl Clock,
    ) -> Self {
        Self {
            id,
            service_required: service_required.into(),
            priority: priority.clamp(0, 100),
            payload,
            requirements,
            customer_id,
            workflow_id: None,
            workflow_priority: None,
            workflow_datetime: None,
            step_number: None,
            max_retries,
            retry_count: 0,
            created_at: clock.epoch_ms(),
            assigned_at: None,
            started_at: None,
            completed_at: None,
            failed_at: None,
            worker_id: None,
            last_failed_worker: None,
            service_job_id: None,
            status: JobStatus::Pending,
            submission_seq,
            result: None,
            error: None,
        }
    }

    /// The composite score used to order the pending queue:
    /// `priority * 10^9 + (MAX - created_at_ms)`, further broken by
    /// `submission_seq` at the caller (scores alone are not guaranteed
    /// unique across very close timestamps).
    pub fn queue_score(&self) -> i64 {
        const MAX_TS: i64 = 4_102_444_800_000; // year 2100, far future ceiling
        (self.priority as i64) * 1_000_000_000 + (MAX_TS - self.created_at)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// `pending -> queued` on submission commit.
    pub fn commit_to_queue(&mut self) -> DomainResult<()> {
        if self.status != JobStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: JobStatus::Queued.to_string(),
            });
        }
        self.status = JobStatus::Queued;
        Ok(())
    }

    /// `queued -> assigned`, performed atomically by the Matcher.
    pub fn assign(&mut self, worker_id: &str, now_ms: i64) -> DomainResult<()> {
        if self.status != JobStatus::Queued {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: JobStatus::Assigned.to_string(),
            });
        }
        self.status = JobStatus::Assigned;
        self.worker_id = Some(worker_id.to_string());
        self.assigned_at = Some(now_ms);
        Ok(())
    }

    /// `assigned -> accepted`.
    pub fn accept(&mut self) -> DomainResult<()> {
        if self.status != JobStatus::Assigned {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: JobStatus::Accepted.to_string(),
            });
        }
        self.status = JobStatus::Accepted;
        Ok(())
    }

    /// `accepted -> in_progress`.
    pub fn start(&mut self, now_ms: i64) -> DomainResult<()> {
        if self.status != JobStatus::Accepted {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: JobStatus::InProgress.to_string(),
            });
        }
        self.status = JobStatus::InProgress;
        self.started_at = Some(now_ms);
        Ok(())
    }

    /// `in_progress -> completed`. Idempotent: a second call on an
    /// already-completed job is a documented no-op.
    pub fn complete(&mut self, result: serde_json::Value, now_ms: i64) -> DomainResult<()> {
        if self.status == JobStatus::Completed {
            return Ok(());
        }
        if self.is_terminal() {
            return Err(DomainError::AlreadyTerminal { status: self.status.to_string() });
        }
        self.status = JobStatus::Completed;
        self.completed_at = Some(now_ms);
        self.result = Some(result);
        Ok(())
    }

    /// Release back to `queued`, or to terminal `failed` if the retry
    /// budget is exhausted.
    pub fn release_for_retry(&mut self, failed_worker: &str, now_ms: i64) -> DomainResult<bool> {
        if self.is_terminal() {
            return Err(DomainError::AlreadyTerminal { status: self.status.to_string() });
        }
        self.last_failed_worker = Some(failed_worker.to_string());
        self.retry_count += 1;
        self.worker_id = None;
        if self.retry_count > self.max_retries {
            self.status = JobStatus::Failed;
            self.failed_at = Some(now_ms);
            return Ok(false);
        }
        self.status = JobStatus::Queued;
        self.assigned_at = None;
        self.started_at = None;
        Ok(true)
    }

    /// Terminal failure with no retry (`can_retry=false`, or budget
    /// already exhausted).
    pub fn fail_terminal(&mut self, error: impl Into<String>, now_ms: i64) -> DomainResult<()> {
        if self.is_terminal() {
            return Ok(());
        }
        self.status = JobStatus::Failed;
        self.failed_at = Some(now_ms);
        self.error = Some(error.into());
        Ok(())
    }

    /// Any non-terminal -> `cancelled`.
    pub fn cancel(&mut self, reason: Option<String>, now_ms: i64) -> DomainResult<()> {
        if self.is_terminal() {
            return Err(DomainError::AlreadyTerminal { status: self.status.to_string() });
        }
        self.status = JobStatus::Cancelled;
        self.failed_at = Some(now_ms);
        self.error = reason;
        Ok(())
    }
}

/// A worker's advertised capability set, consumed by the Matcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerCapabilities {
    /// Already-expanded service tags this worker accepts. Expansion
    /// happens once at registration, never again at match time.
    pub service_tags: HashSet<String>,
    pub gpu_memory_gb: f64,
    pub ram_gb: f64,
    pub cpu_cores: u32,
    pub gpu_count: u32,
    pub components: HashSet<String>,
    pub workflows: HashSet<String>,
    pub customer_id: Option<String>,
    /// Customers this worker is permitted to serve under `loose` isolation.
    pub customer_access: HashSet<String>,
    pub max_concurrent_jobs: u32,
}

impl WorkerCapabilities {
    /// Decide if `job` is eligible for a worker with these capabilities.
    /// The filter order is fixed so short-circuiting is observable in
    /// tests: service tag, hardware bounds, components/workflows,
    /// customer isolation, then last-failed-worker exclusion.
    pub fn accepts(&self, job: &Job, worker_id: &str) -> bool {
        if !self.service_tags.contains(&job.service_required) {
            return false;
        }
        let hw = &job.requirements.hardware;
        if let Some(v) = hw.gpu_memory_gb {
            if v > self.gpu_memory_gb {
                return false;
            }
        }
        if let Some(v) = hw.ram_gb {
            if v > self.ram_gb {
                return false;
            }
        }
        if let Some(v) = hw.cpu_cores {
            if v > self.cpu_cores {
                return false;
            }
        }
        if let Some(v) = hw.gpu_count {
            if v > self.gpu_count {
                return false;
            }
        }
        if !job.requirements.components.is_empty()
            && !job.requirements.components.iter().any(|c| self.components.contains(c))
        {
            return false;
        }
        if !job.requirements.workflows.is_empty()
            && !job.requirements.workflows.iter().any(|w| self.workflows.contains(w))
        {
            return false;
        }
        match job.requirements.customer_isolation {
            Some(CustomerIsolation::Strict) => {
                if job.customer_id.as_deref() != self.customer_id.as_deref() {
                    return false;
                }
            }
            Some(CustomerIsolation::Loose) => {
                if let Some(cust) = &job.customer_id {
                    if !self.customer_access.contains(cust) {
                        return false;
                    }
                }
            }
            Some(CustomerIsolation::None) | None => {}
        }
        if job.last_failed_worker.as_deref() == Some(worker_id) {
            return false;
        }
        true
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
