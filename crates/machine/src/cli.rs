// SPDX-License-Identifier: MIT

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "jobmesh-machine", version, about = "jobmesh machine status aggregator")]
pub struct Cli {
    #[arg(long)]
    pub machine_id: String,
}
