// SPDX-License-Identifier: MIT

//! Machine command handlers.

use anyhow::Result;
use clap::Subcommand;

use crate::client::ApiClient;
use crate::color;
use crate::output::{format_time_ago, OutputFormat, Table};

#[derive(Subcommand)]
pub enum MachineCommand {
    /// List known machines.
    List {},
}

pub async fn handle(command: MachineCommand, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match command {
        MachineCommand::List {} => {
            let machines = client.list_machines().await?;
            match format {
                OutputFormat::Json => crate::output::print_json(&machines)?,
                OutputFormat::Text => {
                    if machines.is_empty() {
                        println!("no machines known");
                        return Ok(());
                    }
                    let mut table = Table::new(vec!["ID", "STATUS", "WORKERS", "UPTIME", "SAMPLED"]);
                    for m in &machines {
                        table.row(vec![
                            m.machine_id.clone(),
                            color::status(&m.status.to_string()),
                            m.workers.len().to_string(),
                            format!("{}s", m.uptime_secs),
                            format_time_ago(m.sampled_at),
                        ]);
                    }
                    table.render();
                }
            }
        }
    }
    Ok(())
}
