// SPDX-License-Identifier: MIT

use std::sync::Arc;

use clap::Parser;
use jobmesh_connectors::{ConnectorRegistry, SimulationConfig, SimulationConnector};
use jobmesh_core::{SystemClock, WorkerCapabilities};
use jobmesh_worker::cli::Cli;
use jobmesh_worker::ws_transport::WsBrokerClient;
use jobmesh_worker::{Runtime, RuntimeConfig};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let addr = jobmesh_worker::env::api_addr();

    let mut registry = ConnectorRegistry::new();
    registry.register(Arc::new(SimulationConnector::new(SimulationConfig {
        service_tag: cli.service_tag.clone(),
        ..Default::default()
    })));

    let capabilities = WorkerCapabilities {
        service_tags: std::iter::once(cli.service_tag.clone()).collect(),
        max_concurrent_jobs: cli.max_concurrent_jobs.or_else(jobmesh_worker::env::concurrency).unwrap_or(1),
        ..Default::default()
    };

    let transport = match WsBrokerClient::connect(&addr, &cli.worker_id).await {
        Ok(t) => Arc::new(t),
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to connect to jobmesh-api");
            std::process::exit(1);
        }
    };

    let config = RuntimeConfig {
        worker_id: cli.worker_id.clone(),
        machine_id: cli.machine_id.clone(),
        max_concurrent_jobs: capabilities.max_concurrent_jobs,
        heartbeat_interval: jobmesh_worker::env::heartbeat_interval_ms(),
        drain_timeout: jobmesh_worker::env::drain_timeout_ms(),
        ..RuntimeConfig::default()
    };

    let runtime = Arc::new(Runtime::new(transport, SystemClock, Arc::new(registry), capabilities, config));
    if let Err(e) = runtime.register().await {
        tracing::error!(error = %e, "worker registration failed");
        std::process::exit(1);
    }

    let shutdown = runtime.shutdown_handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining in-flight jobs");
        shutdown.cancel();
    });

    runtime.run().await;
}
