// SPDX-License-Identifier: MIT

//! End-to-end Broker scenarios exercising the pull-based matching
//! contract against an in-memory store.

use std::collections::HashSet;

use jobmesh_broker::{Broker, SubmitJobRequest};
use jobmesh_core::{FakeClock, JobRequirements, JobStatus, WorkerCapabilities, WorkerRecord};
use jobmesh_store::MemorySss;

fn caps(services: &[&str]) -> WorkerCapabilities {
    WorkerCapabilities {
        service_tags: services.iter().map(|s| s.to_string()).collect(),
        gpu_memory_gb: 24.0,
        ram_gb: 64.0,
        cpu_cores: 16,
        gpu_count: 1,
        max_concurrent_jobs: 4,
        ..Default::default()
    }
}

fn request(service: &str, priority: i32) -> SubmitJobRequest {
    SubmitJobRequest {
        service_required: service.into(),
        priority,
        payload: serde_json::json!({}),
        requirements: JobRequirements::default(),
        customer_id: None,
        max_retries: 2,
    }
}

#[tokio::test]
async fn pull_based_fifo_within_priority() {
    let broker = Broker::new(MemorySss::new(), FakeClock::new());
    let j1 = broker.submit_job(request("simulation", 50)).await.unwrap();
    let j2 = broker.submit_job(request("simulation", 50)).await.unwrap();
    let j3 = broker.submit_job(request("simulation", 80)).await.unwrap();

    let w = caps(&["simulation"]);
    let first = broker.claim_next("wrk-1", &w).await.unwrap().unwrap();
    let second = broker.claim_next("wrk-1", &w).await.unwrap().unwrap();
    let third = broker.claim_next("wrk-1", &w).await.unwrap().unwrap();

    assert_eq!(first.id.to_string(), j3, "highest priority claimed first");
    assert_eq!(second.id.to_string(), j1, "earlier submission wins the priority tie");
    assert_eq!(third.id.to_string(), j2);
}

#[tokio::test]
async fn capability_filter_routes_jobs_to_the_right_worker() {
    let broker = Broker::new(MemorySss::new(), FakeClock::new());
    let j_b = broker.submit_job(request("b", 50)).await.unwrap();
    let j_a = broker.submit_job(request("a", 50)).await.unwrap();

    let w1 = caps(&["a"]);
    let w2 = caps(&["a", "b"]);

    let w1_claim = broker.claim_next("w1", &w1).await.unwrap().unwrap();
    assert_eq!(w1_claim.id.to_string(), j_a);

    let w2_claim = broker.claim_next("w2", &w2).await.unwrap().unwrap();
    assert_eq!(w2_claim.id.to_string(), j_b);
}

#[tokio::test]
async fn ten_workers_racing_three_jobs_each_claim_exactly_one() {
    let broker = Broker::new(MemorySss::new(), FakeClock::new());
    for _ in 0..3 {
        broker.submit_job(request("simulation", 50)).await.unwrap();
    }
    let w = caps(&["simulation"]);

    let mut claimed_job_ids = HashSet::new();
    let mut claimed_by_worker = HashSet::new();
    let mut successes = 0;
    for i in 0..10 {
        let worker_id = format!("wrk-{i}");
        if let Some(job) = broker.claim_next(&worker_id, &w).await.unwrap() {
            successes += 1;
            assert!(claimed_job_ids.insert(job.id.to_string()), "no job claimed twice");
            claimed_by_worker.insert(worker_id);
        }
    }
    assert_eq!(successes, 3);
    assert_eq!(claimed_by_worker.len(), 3, "three distinct workers hold the three jobs");
}

#[tokio::test]
async fn orphan_recovery_reassigns_to_a_different_worker() {
    let clock = FakeClock::new();
    let broker = Broker::new(MemorySss::new(), clock.clone());
    let job_id = broker.submit_job(request("simulation", 50)).await.unwrap();

    let w = caps(&["simulation"]);
    let record = WorkerRecord::new("wrk-dead", "mch-1", w.clone(), "1.0.0", clock.epoch_ms());
    broker.register_worker(&record).await.unwrap();
    let claimed = broker.claim_next("wrk-dead", &w).await.unwrap().unwrap();
    assert_eq!(claimed.status, JobStatus::Assigned);

    clock.advance(std::time::Duration::from_millis(10_000));
    let released = broker.detect_orphans(4_000).await.unwrap();
    assert_eq!(released, 1);

    let job = broker.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.last_failed_worker.as_deref(), Some("wrk-dead"));
    assert_eq!(job.retry_count, 1);

    let claimed_again = broker.claim_next("wrk-survivor", &w).await.unwrap().unwrap();
    assert_eq!(claimed_again.worker_id.as_deref(), Some("wrk-survivor"));
}

#[tokio::test]
async fn cancel_during_run_blocks_later_completion() {
    let broker = Broker::new(MemorySss::new(), FakeClock::new());
    let job_id = broker.submit_job(request("simulation", 50)).await.unwrap();
    broker.claim_next("wrk-1", &caps(&["simulation"])).await.unwrap().unwrap();

    let notified_worker = broker.cancel(&job_id, Some("operator abort".into())).await.unwrap();
    assert_eq!(notified_worker.as_deref(), Some("wrk-1"));

    let job = broker.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);

    let complete_after_cancel = broker.complete(&job_id, serde_json::json!({"late": true})).await;
    assert!(complete_after_cancel.is_err(), "a terminal cancelled job rejects a later completion");
}
