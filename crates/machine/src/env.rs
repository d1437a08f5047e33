// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the machine aggregator binary.

use std::time::Duration;

pub fn heartbeat_interval_ms() -> Duration {
    std::env::var("JOBMESH_WORKER_HEARTBEAT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}

pub fn tick_floor_ms() -> Duration {
    std::env::var("JOBMESH_MACHINE_TICK_FLOOR_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(15))
}

pub fn poll_interval_ms() -> Duration {
    std::env::var("JOBMESH_MACHINE_POLL_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(2))
}

/// `JOBMESH_REDIS_URL` — shared with the other binaries; defaults to
/// the conventional local Redis address.
pub fn redis_url() -> String {
    std::env::var("JOBMESH_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}
