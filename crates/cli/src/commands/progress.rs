// SPDX-License-Identifier: MIT

//! Tail a job's progress SSE stream until it reaches a terminal state.

use anyhow::{Context, Result};
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use jobmesh_core::ProgressFrame;

use crate::client::ApiClient;
use crate::color;

const TERMINAL_EVENTS: &[&str] = &["completed", "failed", "cancelled"];

pub async fn handle(job_id: String, client: &ApiClient) -> Result<()> {
    let resp = client.job_progress_stream(&job_id).await?;
    let mut events = resp.bytes_stream().eventsource();

    while let Some(event) = events.next().await {
        let event = event.context("reading progress event")?;
        match event.event.as_str() {
            "connected" => println!("{}", color::muted(&format!("connected, watching {job_id}"))),
            "progress" => {
                if let Ok(frame) = serde_json::from_str::<ProgressFrame>(&event.data) {
                    println!(
                        "[{:>5.1}%] step {}/{} {}",
                        frame.progress_pct, frame.current_step, frame.total_steps, frame.message
                    );
                }
            }
            tag if TERMINAL_EVENTS.contains(&tag) => {
                println!("{}", color::status(tag));
                break;
            }
            _ => {}
        }
    }
    Ok(())
}
