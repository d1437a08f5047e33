// SPDX-License-Identifier: MIT

use std::sync::Arc;

use clap::Parser;
use jobmesh_core::SystemClock;
use jobmesh_machine::cli::Cli;
use jobmesh_machine::{Aggregator, AggregatorConfig, SssWorkerProbe};
use jobmesh_store::RedisSss;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let redis_url = jobmesh_machine::env::redis_url();

    let sss = match RedisSss::connect(&redis_url) {
        Ok(sss) => Arc::new(sss),
        Err(e) => {
            tracing::error!(error = %e, %redis_url, "failed to connect to shared state store");
            std::process::exit(1);
        }
    };

    let probe = Arc::new(SssWorkerProbe::new(sss.clone()));
    let config = AggregatorConfig {
        machine_id: cli.machine_id.clone(),
        heartbeat_interval: jobmesh_machine::env::heartbeat_interval_ms(),
        tick_floor: jobmesh_machine::env::tick_floor_ms(),
        poll_interval: jobmesh_machine::env::poll_interval_ms(),
    };

    let aggregator = Arc::new(Aggregator::new(sss, SystemClock, probe, config));
    let shutdown = aggregator.shutdown_handle();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, publishing final snapshot");
        shutdown.cancel();
    });

    aggregator.run().await;
}
