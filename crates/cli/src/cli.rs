// SPDX-License-Identifier: MIT

use clap::{Parser, Subcommand};

use crate::commands::{job, machine, progress, queue, worker};
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "jobmesh", version, about = "Operator CLI for the jobmesh connection fabric")]
pub struct Cli {
    /// Overrides `JOBMESH_CLI_BASE_URL` (default http://127.0.0.1:8080).
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Output format for list/show commands.
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Submit, inspect, list, and cancel jobs.
    Job {
        #[command(subcommand)]
        command: job::JobCommand,
    },
    /// Aggregate queue/job counts.
    Queue {
        #[command(subcommand)]
        command: queue::QueueCommand,
    },
    /// Inspect registered workers.
    Worker {
        #[command(subcommand)]
        command: worker::WorkerCommand,
    },
    /// Inspect machine snapshots.
    Machine {
        #[command(subcommand)]
        command: machine::MachineCommand,
    },
    /// Tail a job's progress stream until it reaches a terminal state.
    Progress {
        job_id: String,
    },
}
