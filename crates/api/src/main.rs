// SPDX-License-Identifier: MIT

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use jobmesh_api::cli::Cli;
use jobmesh_api::{ApiConfig, AppState};
use jobmesh_core::{Clock, ConnectionKind, SystemClock};
use jobmesh_store::{RedisSss, Sss};
use jobmesh_wire::Payload;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let redis_url = jobmesh_api::env::redis_url();

    let sss = match RedisSss::connect(&redis_url) {
        Ok(sss) => Arc::new(sss),
        Err(e) => {
            tracing::error!(error = %e, %redis_url, "failed to connect to shared state store");
            std::process::exit(1);
        }
    };

    let config = ApiConfig {
        heartbeat_interval_ms: jobmesh_api::env::heartbeat_interval_ms(),
        connection_timeout_ms: jobmesh_api::env::connection_timeout_ms(),
        stats_interval_ms: jobmesh_api::env::stats_interval_ms(),
    };
    let state = AppState::new(sss, SystemClock, config);

    tokio::spawn(state.fabric.clone().run());
    tokio::spawn(heartbeat_and_cleanup_loop(state.clone()));
    tokio::spawn(stats_broadcast_loop(state.clone()));

    let bind = cli.bind.unwrap_or_else(jobmesh_api::env::bind_addr);
    let listener = match tokio::net::TcpListener::bind(&bind).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %bind, "failed to bind");
            std::process::exit(1);
        }
    };

    tracing::info!(%bind, "jobmesh-api listening");
    if let Err(e) = axum::serve(listener, jobmesh_api::app(state)).with_graceful_shutdown(shutdown_signal()).await {
        tracing::error!(error = %e, "server exited with an error");
        std::process::exit(1);
    }
}

/// Every `heartbeat_interval_ms`: ping every worker/client connection,
/// evict whoever has gone quiet past `connection_timeout_ms`, and run
/// orphan detection so jobs held by evicted/vanished workers are
/// released back to the queue.
async fn heartbeat_and_cleanup_loop<S: Sss + 'static, C: Clock + 'static>(state: AppState<S, C>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(state.config.heartbeat_interval_ms.max(1) as u64));
    loop {
        ticker.tick().await;
        let now = state.clock.epoch_ms();

        let pinged = state.cm.ping_all(now).await;
        tracing::debug!(workers = pinged.workers_pinged, clients = pinged.clients_pinged, "pinged connections");

        let evicted = state.cm.cleanup_stale(now, state.config.connection_timeout_ms).await;
        if !evicted.evicted_workers.is_empty() || !evicted.evicted_clients.is_empty() {
            tracing::info!(
                evicted_workers = evicted.evicted_workers.len(),
                evicted_clients = evicted.evicted_clients.len(),
                "evicted stale connections"
            );
        }

        match state.broker.detect_orphans(state.config.heartbeat_interval_ms).await {
            Ok(released) if released > 0 => tracing::info!(released, "released orphaned jobs"),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "orphan detection failed"),
        }
    }
}

/// Every `stats_interval_ms`, aggregate queue/worker counts and
/// broadcast them to every monitor connection.
async fn stats_broadcast_loop<S: Sss + 'static, C: Clock + 'static>(state: AppState<S, C>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(state.config.stats_interval_ms.max(1) as u64));
    loop {
        ticker.tick().await;
        let now = state.clock.epoch_ms();

        let stats = match state.broker.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::warn!(error = %e, "failed to gather stats for broadcast");
                continue;
            }
        };
        let workers = match state.broker.list_workers().await {
            Ok(workers) => workers,
            Err(e) => {
                tracing::warn!(error = %e, "failed to list workers for stats broadcast");
                continue;
            }
        };
        let idle_workers = workers.iter().filter(|w| w.status == jobmesh_core::WorkerStatus::Idle).count() as u64;
        let busy_workers = workers.iter().filter(|w| w.status == jobmesh_core::WorkerStatus::Busy).count() as u64;

        state
            .cm
            .broadcast(
                ConnectionKind::Monitor,
                Payload::StatsBroadcast { queued: stats.pending, in_progress: stats.in_progress, idle_workers, busy_workers },
                now,
            )
            .await;
    }
}

/// Resolves once SIGINT or (on unix) SIGTERM arrives, so `axum::serve`
/// can drain in-flight requests before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}
