// SPDX-License-Identifier: MIT

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "jobmesh-api", version, about = "jobmesh connection fabric and HTTP/WS gateway")]
pub struct Cli {
    /// Overrides `JOBMESH_API_BIND`.
    #[arg(long)]
    pub bind: Option<String>,
}
