// SPDX-License-Identifier: MIT

//! Job command handlers: submit, get, list, cancel.

use anyhow::{Context, Result};
use clap::Subcommand;
use jobmesh_broker::SubmitJobRequest;
use jobmesh_core::{Job, JobStatus};

use crate::client::ApiClient;
use crate::color;
use crate::output::{format_time_ago, OutputFormat, Table};

fn parse_status(raw: &str) -> Result<JobStatus, String> {
    match raw {
        "pending" => Ok(JobStatus::Pending),
        "queued" => Ok(JobStatus::Queued),
        "assigned" => Ok(JobStatus::Assigned),
        "accepted" => Ok(JobStatus::Accepted),
        "in_progress" => Ok(JobStatus::InProgress),
        "completed" => Ok(JobStatus::Completed),
        "failed" => Ok(JobStatus::Failed),
        "timeout" => Ok(JobStatus::Timeout),
        "cancelled" => Ok(JobStatus::Cancelled),
        other => Err(format!("unknown job status {other:?}")),
    }
}

#[derive(Subcommand)]
pub enum JobCommand {
    /// Submit a new job.
    Submit {
        /// Service tag the job requires (matched against worker capabilities).
        service_required: String,
        /// JSON object carrying the job's own payload.
        #[arg(long, default_value = "{}")]
        payload: String,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        #[arg(long)]
        customer_id: Option<String>,
        #[arg(long, default_value_t = 0)]
        max_retries: i32,
    },
    /// Show one job by id.
    Get { job_id: String },
    /// List jobs, optionally filtered by status.
    List {
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Cancel a job.
    Cancel {
        job_id: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

fn print_jobs_table(jobs: &[Job]) {
    let mut table = Table::new(vec!["ID", "STATUS", "SERVICE", "PRIORITY", "WORKER", "AGE"]);
    for job in jobs {
        table.row(vec![
            job.id.to_string(),
            color::status(&job.status.to_string()),
            job.service_required.clone(),
            job.priority.to_string(),
            job.worker_id.clone().unwrap_or_else(|| "-".to_string()),
            format_time_ago(job.created_at),
        ]);
    }
    table.render();
}

pub async fn handle(command: JobCommand, client: &ApiClient, format: OutputFormat) -> Result<()> {
    match command {
        JobCommand::Submit { service_required, payload, priority, customer_id, max_retries } => {
            let payload: serde_json::Value =
                serde_json::from_str(&payload).context("--payload must be a JSON object")?;
            let request = SubmitJobRequest { service_required, priority, payload, customer_id, max_retries, ..Default::default() };
            let submitted = client.submit_job(&request).await?;
            println!("submitted {} ({})", submitted.job_id, submitted.status);
        }
        JobCommand::Get { job_id } => {
            let job = client.get_job(&job_id).await?;
            match format {
                OutputFormat::Json => crate::output::print_json(&job)?,
                OutputFormat::Text => print_jobs_table(std::slice::from_ref(&job)),
            }
        }
        JobCommand::List { status, limit, offset } => {
            let jobs = client.list_jobs(status, limit, offset).await?;
            match format {
                OutputFormat::Json => crate::output::print_json(&jobs)?,
                OutputFormat::Text => {
                    if jobs.is_empty() {
                        println!("no jobs found");
                    } else {
                        print_jobs_table(&jobs);
                    }
                }
            }
        }
        JobCommand::Cancel { job_id, reason } => {
            client.cancel_job(&job_id, reason).await?;
            println!("cancelled {job_id}");
        }
    }
    Ok(())
}
