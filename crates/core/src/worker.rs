// SPDX-License-Identifier: MIT

//! Worker domain model.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::job::WorkerCapabilities;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
    Offline,
    Error,
}

crate::simple_display! {
    WorkerStatus {
        Idle => "idle",
        Busy => "busy",
        Offline => "offline",
        Error => "error",
    }
}

/// A registered worker, owned by the Shared State Store but read/updated
/// by the broker and API process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRecord {
    pub worker_id: String,
    pub machine_id: String,
    pub capabilities: WorkerCapabilities,
    pub status: WorkerStatus,
    pub current_job_ids: HashSet<String>,
    pub connected_at: i64,
    pub last_heartbeat: i64,
    pub jobs_completed: u64,
    pub jobs_failed: u64,
    pub version: String,
}

impl WorkerRecord {
    pub fn new(
        worker_id: impl Into<String>,
        machine_id: impl Into<String>,
        capabilities: WorkerCapabilities,
        version: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            machine_id: machine_id.into(),
            capabilities,
            status: WorkerStatus::Idle,
            current_job_ids: HashSet::new(),
            connected_at: now_ms,
            last_heartbeat: now_ms,
            jobs_completed: 0,
            jobs_failed: 0,
            version: version.into(),
        }
    }

    /// `true` once `now_ms - last_heartbeat >= 2 * heartbeat_interval_ms`.
    pub fn is_expired(&self, now_ms: i64, heartbeat_interval_ms: i64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat) >= 2 * heartbeat_interval_ms
    }

    pub fn is_at_concurrency_budget(&self) -> bool {
        self.current_job_ids.len() as u32 >= self.capabilities.max_concurrent_jobs.max(1)
    }

    pub fn touch_heartbeat(&mut self, now_ms: i64) {
        self.last_heartbeat = now_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> WorkerRecord {
        WorkerRecord::new("wrk-1", "mch-1", WorkerCapabilities::default(), "1.0.0", 1_000)
    }

    #[test]
    fn new_worker_is_idle_with_no_jobs() {
        let w = record();
        assert_eq!(w.status, WorkerStatus::Idle);
        assert!(w.current_job_ids.is_empty());
    }

    #[test]
    fn expiry_requires_two_missed_heartbeat_intervals() {
        let mut w = record();
        w.last_heartbeat = 0;
        assert!(!w.is_expired(1_999, 1_000));
        assert!(w.is_expired(2_000, 1_000));
    }

    #[test]
    fn concurrency_budget_defaults_to_at_least_one_slot() {
        let mut w = record();
        w.current_job_ids.insert("job-1".into());
        assert!(w.is_at_concurrency_budget());
    }
}
