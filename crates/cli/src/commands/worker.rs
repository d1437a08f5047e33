// SPDX-License-Identifier: MIT

//! Worker command handlers.

use anyhow::Result;
use clap::Subcommand;

use crate::client::ApiClient;
use crate::color;
use crate::output::{format_time_ago, OutputFormat, Table};

#[derive(Subcommand)]
pub enum WorkerCommand {
    /// List registered workers.
    List {},
}

pub async fn handle(command: WorkerCommand, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match command {
        WorkerCommand::List {} => {
            let workers = client.list_workers().await?;
            match format {
                OutputFormat::Json => crate::output::print_json(&workers)?,
                OutputFormat::Text => {
                    if workers.is_empty() {
                        println!("no workers registered");
                        return Ok(());
                    }
                    let mut table =
                        Table::new(vec!["ID", "MACHINE", "STATUS", "JOBS", "FAILED", "LAST HEARTBEAT"]);
                    for w in &workers {
                        table.row(vec![
                            w.worker_id.clone(),
                            w.machine_id.clone(),
                            color::status(&w.status.to_string()),
                            w.jobs_completed.to_string(),
                            w.jobs_failed.to_string(),
                            format_time_ago(w.last_heartbeat),
                        ]);
                    }
                    table.render();
                }
            }
        }
    }
    Ok(())
}
