// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the API binary.

/// `JOBMESH_API_BIND` — `host:port` to listen on (default `0.0.0.0:8080`).
pub fn bind_addr() -> String {
    std::env::var("JOBMESH_API_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string())
}

/// `JOBMESH_REDIS_URL` — shared state store connection string.
pub fn redis_url() -> String {
    std::env::var("JOBMESH_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

pub fn heartbeat_interval_ms() -> i64 {
    std::env::var("JOBMESH_WORKER_HEARTBEAT_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(10_000)
}

/// `JOBMESH_CONNECTION_TIMEOUT_MS` — how long a worker/client connection
/// may stay quiet before `cleanup_stale` evicts it.
pub fn connection_timeout_ms() -> i64 {
    std::env::var("JOBMESH_CONNECTION_TIMEOUT_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(30_000)
}

/// `JOBMESH_STATS_INTERVAL_MS` — cadence of the stats-broadcast loop.
pub fn stats_interval_ms() -> i64 {
    std::env::var("JOBMESH_STATS_INTERVAL_MS").ok().and_then(|s| s.parse().ok()).unwrap_or(5_000)
}
