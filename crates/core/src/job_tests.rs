// SPDX-License-Identifier: MIT

use super::*;
use crate::clock::FakeClock;
use crate::ids::JobId;
use yare::parameterized;

fn make_job(priority: i32) -> Job {
    let clock = FakeClock::new();
    Job::new(
        JobId::new(),
        "comfyui",
        priority,
        serde_json::json!({"prompt": "hi"}),
        JobRequirements::default(),
        None,
        3,
        0,
        &clock,
    )
}

#[test]
fn new_job_starts_pending() {
    let job = make_job(50);
    assert_eq!(job.status, JobStatus::Pending);
    assert!(!job.is_terminal());
}

#[test]
fn priority_is_clamped_into_range() {
    assert_eq!(make_job(500).priority, 100);
    assert_eq!(make_job(-5).priority, 0);
}

#[test]
fn full_happy_path_transitions() {
    let mut job = make_job(10);
    job.commit_to_queue().expect("queue");
    assert_eq!(job.status, JobStatus::Queued);
    job.assign("wrk-w1", 10).expect("assign");
    assert_eq!(job.status, JobStatus::Assigned);
    assert_eq!(job.worker_id.as_deref(), Some("wrk-w1"));
    job.accept().expect("accept");
    job.start(20).expect("start");
    assert_eq!(job.status, JobStatus::InProgress);
    job.complete(serde_json::json!({"ok": true}), 30).expect("complete");
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.is_terminal());
}

#[test]
fn complete_is_idempotent() {
    let mut job = make_job(10);
    job.commit_to_queue().expect("queue");
    job.assign("wrk-w1", 0).expect("assign");
    job.accept().expect("accept");
    job.start(0).expect("start");
    job.complete(serde_json::json!(1), 5).expect("first complete");
    job.complete(serde_json::json!(2), 6).expect("second complete is a no-op");
    assert_eq!(job.result, Some(serde_json::json!(1)));
}

#[test]
fn complete_after_other_terminal_status_errors() {
    let mut job = make_job(10);
    job.commit_to_queue().expect("queue");
    job.cancel(None, 5).expect("cancel");
    assert!(job.complete(serde_json::json!(1), 6).is_err());
}

#[test]
fn release_for_retry_requeues_until_budget_exhausted() {
    let mut job = make_job(10);
    job.commit_to_queue().expect("queue");
    job.assign("wrk-w1", 0).expect("assign");
    job.accept().expect("accept");
    job.start(0).expect("start");

    let requeued = job.release_for_retry("wrk-w1", 5).expect("release 1");
    assert!(requeued);
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.last_failed_worker.as_deref(), Some("wrk-w1"));

    for _ in 0..job.max_retries {
        job.assign("wrk-w1", 0).expect("reassign");
        job.accept().expect("accept");
        job.start(0).expect("start");
        job.release_for_retry("wrk-w1", 5).expect("release n");
    }
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.retry_count > job.max_retries);
}

#[test]
fn cancel_non_terminal_job() {
    let mut job = make_job(10);
    job.commit_to_queue().expect("queue");
    job.cancel(Some("user requested".into()), 9).expect("cancel");
    assert_eq!(job.status, JobStatus::Cancelled);
    assert_eq!(job.error.as_deref(), Some("user requested"));
}

#[test]
fn cancel_twice_errors() {
    let mut job = make_job(10);
    job.commit_to_queue().expect("queue");
    job.cancel(None, 9).expect("first cancel");
    assert!(job.cancel(None, 10).is_err());
}

fn caps_accepting(tag: &str) -> WorkerCapabilities {
    WorkerCapabilities {
        service_tags: [tag.to_string()].into_iter().collect(),
        gpu_memory_gb: 24.0,
        ram_gb: 64.0,
        cpu_cores: 16,
        gpu_count: 1,
        max_concurrent_jobs: 1,
        ..Default::default()
    }
}

#[test]
fn capability_filter_rejects_unknown_service_tag() {
    let job = make_job(10);
    let caps = caps_accepting("a1111");
    assert!(!caps.accepts(&job, "wrk-w1"));
}

#[test]
fn capability_filter_accepts_matching_service_tag() {
    let job = make_job(10);
    let caps = caps_accepting("comfyui");
    assert!(caps.accepts(&job, "wrk-w1"));
}

#[parameterized(
    gpu_mem_too_low = { HardwareRequirements { gpu_memory_gb: Some(48.0), ..Default::default() } },
    ram_too_low = { HardwareRequirements { ram_gb: Some(128.0), ..Default::default() } },
    cores_too_low = { HardwareRequirements { cpu_cores: Some(64), ..Default::default() } },
    gpu_count_too_low = { HardwareRequirements { gpu_count: Some(4), ..Default::default() } },
)]
fn hardware_lower_bounds_reject_insufficient_workers(hw: HardwareRequirements) {
    let mut job = make_job(10);
    job.requirements.hardware = hw;
    let caps = caps_accepting("comfyui");
    assert!(!caps.accepts(&job, "wrk-w1"));
}

#[test]
fn last_failed_worker_is_skipped_on_next_claim() {
    let mut job = make_job(10);
    job.last_failed_worker = Some("wrk-w1".into());
    let caps = caps_accepting("comfyui");
    assert!(!caps.accepts(&job, "wrk-w1"));
    assert!(caps.accepts(&job, "wrk-w2"));
}

#[test]
fn strict_customer_isolation_requires_exact_match() {
    let mut job = make_job(10);
    job.customer_id = Some("acme".into());
    job.requirements.customer_isolation = Some(CustomerIsolation::Strict);
    let mut caps = caps_accepting("comfyui");
    caps.customer_id = Some("other".into());
    assert!(!caps.accepts(&job, "wrk-w1"));
    caps.customer_id = Some("acme".into());
    assert!(caps.accepts(&job, "wrk-w1"));
}

#[test]
fn loose_customer_isolation_checks_access_list() {
    let mut job = make_job(10);
    job.customer_id = Some("acme".into());
    job.requirements.customer_isolation = Some(CustomerIsolation::Loose);
    let mut caps = caps_accepting("comfyui");
    assert!(!caps.accepts(&job, "wrk-w1"));
    caps.customer_access.insert("acme".into());
    assert!(caps.accepts(&job, "wrk-w1"));
}

#[test]
fn queue_score_orders_by_priority_then_recency() {
    let low = make_job(10);
    let high = make_job(90);
    assert!(high.queue_score() > low.queue_score());
}
