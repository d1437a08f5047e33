// SPDX-License-Identifier: MIT

//! Queue command handlers: aggregate job counts.

use anyhow::Result;
use clap::Subcommand;

use crate::client::ApiClient;
use crate::output::OutputFormat;

#[derive(Subcommand)]
pub enum QueueCommand {
    /// Show aggregate job counts by status.
    Status {},
}

pub async fn handle(command: QueueCommand, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match command {
        QueueCommand::Status {} => {
            let stats = client.stats().await?;
            match format {
                OutputFormat::Json => crate::output::print_json(&stats)?,
                OutputFormat::Text => {
                    println!("pending:     {}", stats.pending);
                    println!("assigned:    {}", stats.assigned);
                    println!("in_progress: {}", stats.in_progress);
                    println!("completed:   {}", stats.completed);
                    println!("failed:      {}", stats.failed);
                    println!("cancelled:   {}", stats.cancelled);
                }
            }
        }
    }
    Ok(())
}
