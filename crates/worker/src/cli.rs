// SPDX-License-Identifier: MIT

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "jobmesh-worker", version, about = "jobmesh worker runtime")]
pub struct Cli {
    #[arg(long)]
    pub worker_id: String,

    #[arg(long)]
    pub machine_id: String,

    #[arg(long, default_value = "simulation")]
    pub service_tag: String,

    #[arg(long)]
    pub max_concurrent_jobs: Option<u32>,
}
