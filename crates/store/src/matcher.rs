// SPDX-License-Identifier: MIT

//! The Atomic Matcher: given a worker's capabilities, find the
//! highest-priority eligible job and claim it so that, even under
//! concurrent requests, each pending job is handed to exactly one
//! worker.
//!
//! Two independent paths implement the same algorithm:
//! - [`claim_next_scripted`] runs [`MATCHER_SCRIPT`] server-side
//!   against Redis via `EVAL`, giving true cross-key atomicity.
//! - [`claim_next_cas`] is a bounded compare-and-set loop over the
//!   [`Sss`] trait, used by [`crate::memory::MemorySss`] (whose single
//!   mutex already serializes everything, so contention is rare) and
//!   by any future backend that cannot offer server-side scripting.
//!
//! [`order_candidates`] and [`pick_winner`] are the pure reference
//! implementation shared by both paths' tests, so a property test can
//! assert the Lua script and the CAS loop agree on every input.

use jobmesh_core::{Clock, Job, WorkerCapabilities};

use crate::error::{StoreError, StoreResult};
use crate::sss::Sss;

pub const DEFAULT_SCAN_LIMIT: usize = 200;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;
pub const PENDING_QUEUE_KEY: &str = "queue:pending";
pub const MATCHER_SCRIPT: &str = include_str!("matcher.lua");

pub fn job_key(job_id: &str) -> String {
    format!("job:{job_id}")
}

/// Sort candidates the way the pending queue is defined: priority
/// descending, then age ascending, then submission order ascending.
/// The zset range read only guarantees an approximately-correct
/// prefix, so every caller re-sorts before picking a winner.
pub fn order_candidates(mut jobs: Vec<Job>) -> Vec<Job> {
    jobs.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.submission_seq.cmp(&b.submission_seq))
    });
    jobs
}

/// First candidate, in order, that the worker's capabilities accept.
pub fn pick_winner<'a>(candidates: &'a [Job], capabilities: &WorkerCapabilities, worker_id: &str) -> Option<&'a Job> {
    candidates.iter().find(|job| capabilities.accepts(job, worker_id))
}

/// Bounded compare-and-set claim loop over any [`Sss`] backend.
///
/// Each attempt: read the top `scan_limit` pending job ids by score,
/// load their records, pick a winner, then re-read that winner's
/// record to confirm nobody else claimed it first before writing the
/// assignment. A mismatch on re-read means contention; retry. Giving
/// up after `max_attempts` surfaces as [`StoreError::MatcherContention`],
/// which callers treat the same as "no match" for back-off purposes.
pub async fn claim_next_cas(
    sss: &dyn Sss,
    worker_id: &str,
    capabilities: &WorkerCapabilities,
    clock: &impl Clock,
    scan_limit: usize,
    max_attempts: u32,
) -> StoreResult<Option<Job>> {
    for _attempt in 0..max_attempts {
        let scored = sss.zrevrange(PENDING_QUEUE_KEY, scan_limit).await?;
        if scored.is_empty() {
            return Ok(None);
        }

        let mut candidates = Vec::with_capacity(scored.len());
        let mut raw_by_id = std::collections::HashMap::new();
        for scored_member in &scored {
            if let Some(raw) = sss.hget(&job_key(&scored_member.member), "data").await? {
                if let Ok(job) = serde_json::from_str::<Job>(&raw) {
                    raw_by_id.insert(job.id.to_string(), raw);
                    candidates.push(job);
                }
            }
        }

        let ordered = order_candidates(candidates);
        let Some(winner) = pick_winner(&ordered, capabilities, worker_id) else {
            return Ok(None);
        };

        let winner_id = winner.id.to_string();
        let expected_raw = raw_by_id.get(&winner_id).cloned().unwrap_or_default();
        let current_raw = sss.hget(&job_key(&winner_id), "data").await?;
        if current_raw.as_deref() != Some(expected_raw.as_str()) {
            continue; // someone else mutated this job between read and claim; retry
        }

        let mut claimed = winner.clone();
        claimed
            .assign(worker_id, clock.epoch_ms())
            .map_err(|e| StoreError::Command(format!("matcher tried to assign an unclaimable job: {e}")))?;

        let encoded = serde_json::to_string(&claimed)
            .map_err(|e| StoreError::Decode { key: job_key(&winner_id), field: "data".into(), source: e })?;
        sss.hset(&job_key(&winner_id), "data", &encoded).await?;
        sss.zrem(PENDING_QUEUE_KEY, &winner_id).await?;
        return Ok(Some(claimed));
    }
    Err(StoreError::MatcherContention { attempts: max_attempts })
}

/// Run [`MATCHER_SCRIPT`] against Redis via `EVAL`. Cross-key
/// atomicity here comes from Redis itself: the whole script runs
/// single-threaded with respect to every other command, so there is
/// no read-then-write race window to retry against.
pub async fn claim_next_scripted(
    redis_sss: &crate::redis_sss::RedisSss,
    worker_id: &str,
    capabilities: &WorkerCapabilities,
    now_ms: i64,
    scan_limit: usize,
) -> StoreResult<Option<Job>> {
    let caps_json = serde_json::to_string(capabilities)
        .map_err(|e| StoreError::Decode { key: "capabilities".into(), field: "data".into(), source: e })?;
    let raw: Option<String> = redis_sss
        .eval_matcher_script(PENDING_QUEUE_KEY, "job:", worker_id, scan_limit, &caps_json, now_ms)
        .await?;
    match raw {
        None => Ok(None),
        Some(json) => serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StoreError::Decode { key: "matcher_result".into(), field: "data".into(), source: e }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobmesh_core::test_support::JobFixture;
    use jobmesh_core::{FakeClock, JobRequirements};
    use std::collections::HashSet;

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

    #[test]
    fn picks_highest_priority_eligible_first() {
        let low = JobFixture::default().priority(10).build();
        let high = JobFixture::default().priority(90).build();
        let jobs = order_candidates(vec![low.clone(), high.clone()]);
        let winner = pick_winner(&jobs, &caps("simulation"), "wrk-1").unwrap();
        assert_eq!(winner.id, high.id);
    }

    #[test]
    fn skips_job_last_failed_by_this_worker_even_if_highest_priority() {
        let mut high = JobFixture::default().priority(90).build();
        high.last_failed_worker = Some("wrk-1".to_string());
        let low = JobFixture::default().priority(10).build();
        let jobs = order_candidates(vec![high, low.clone()]);
        let winner = pick_winner(&jobs, &caps("simulation"), "wrk-1").unwrap();
        assert_eq!(winner.id, low.id);
    }

    #[test]
    fn ties_broken_by_submission_sequence() {
        let first = JobFixture::default().priority(50).submission_seq(1).build();
        let second = JobFixture::default().priority(50).submission_seq(2).build();
        let jobs = order_candidates(vec![second.clone(), first.clone()]);
        assert_eq!(jobs[0].id, first.id);
        assert_eq!(jobs[1].id, second.id);
    }

    #[tokio::test]
    async fn claim_next_cas_assigns_and_removes_from_queue() {
        use crate::memory::MemorySss;

        let sss = MemorySss::new();
        let clock = FakeClock::new();
        let job = JobFixture::default().service_required("comfyui").priority(70).build();
        let encoded = serde_json::to_string(&job).unwrap();
        sss.hset(&job_key(&job.id.to_string()), "data", &encoded).await.unwrap();
        sss.zadd(PENDING_QUEUE_KEY, &job.id.to_string(), job.queue_score() as f64).await.unwrap();

        let claimed = claim_next_cas(&sss, "wrk-1", &caps("comfyui"), &clock, DEFAULT_SCAN_LIMIT, DEFAULT_MAX_ATTEMPTS)
            .await
            .unwrap()
            .expect("a match");
        assert_eq!(claimed.worker_id.as_deref(), Some("wrk-1"));

        let remaining = sss.zrevrange(PENDING_QUEUE_KEY, 10).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn claim_next_cas_returns_none_when_no_capability_matches() {
        use crate::memory::MemorySss;

        let sss = MemorySss::new();
        let clock = FakeClock::new();
        let mut job = JobFixture::default().service_required("a1111").priority(70).build();
        job.requirements = JobRequirements { hardware: Default::default(), ..Default::default() };
        let encoded = serde_json::to_string(&job).unwrap();
        sss.hset(&job_key(&job.id.to_string()), "data", &encoded).await.unwrap();
        sss.zadd(PENDING_QUEUE_KEY, &job.id.to_string(), job.queue_score() as f64).await.unwrap();

        let claimed =
            claim_next_cas(&sss, "wrk-1", &caps("comfyui"), &clock, DEFAULT_SCAN_LIMIT, DEFAULT_MAX_ATTEMPTS)
                .await
                .unwrap();
        assert!(claimed.is_none());
    }
}
