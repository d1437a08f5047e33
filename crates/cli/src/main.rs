// SPDX-License-Identifier: MIT

use clap::Parser;

use jobmesh_cli::cli::{Cli, Command};
use jobmesh_cli::client::ApiClient;
use jobmesh_cli::commands::{job, machine, progress, queue, worker};
use jobmesh_cli::error::ExitError;
use jobmesh_cli::env;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let base_url = cli.base_url.unwrap_or_else(env::base_url);
    let client = ApiClient::new(base_url);

    let result = run(cli.command, &client, cli.format).await;
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        let code = e.downcast_ref::<ExitError>().map(|e| e.code).unwrap_or(1);
        std::process::exit(code);
    }
}

async fn run(command: Command, client: &ApiClient, format: jobmesh_cli::output::OutputFormat) -> anyhow::Result<()> {
    match command {
        Command::Job { command } => job::handle(command, client, format).await,
        Command::Queue { command } => queue::handle(command, client, format).await,
        Command::Worker { command } => worker::handle(command, client, format).await,
        Command::Machine { command } => machine::handle(command, client, format).await,
        Command::Progress { job_id } => progress::handle(job_id, client).await,
    }
}
