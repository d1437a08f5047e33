// SPDX-License-Identifier: MIT

//! Progress stream frames.

use serde::{Deserialize, Serialize};

/// One entry in a job's append-only progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressFrame {
    pub job_id: String,
    pub progress_pct: f64,
    pub message: String,
    pub current_step: u32,
    pub total_steps: u32,
    pub estimated_completion_ms: Option<i64>,
    pub worker_id: String,
    pub timestamp: i64,
}

impl ProgressFrame {
    pub fn new(
        job_id: impl Into<String>,
        worker_id: impl Into<String>,
        progress_pct: f64,
        message: impl Into<String>,
        current_step: u32,
        total_steps: u32,
        estimated_completion_ms: Option<i64>,
        timestamp: i64,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            progress_pct: progress_pct.clamp(0.0, 100.0),
            message: message.into(),
            current_step,
            total_steps,
            estimated_completion_ms,
            worker_id: worker_id.into(),
            timestamp,
        }
    }
}
