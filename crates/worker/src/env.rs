// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the worker binary.

use std::time::Duration;

/// `JOBMESH_WORKER_CONCURRENCY` overrides `--max-concurrent-jobs`.
pub fn concurrency() -> Option<u32> {
    std::env::var("JOBMESH_WORKER_CONCURRENCY").ok().and_then(|s| s.parse().ok())
}

/// `JOBMESH_API_ADDR` — `host:port` of the API process (default `127.0.0.1:8080`).
pub fn api_addr() -> String {
    std::env::var("JOBMESH_API_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string())
}

pub fn heartbeat_interval_ms() -> Duration {
    std::env::var("JOBMESH_WORKER_HEARTBEAT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}

pub fn drain_timeout_ms() -> Duration {
    std::env::var("JOBMESH_WORKER_DRAIN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}
