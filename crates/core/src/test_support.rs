// SPDX-License-Identifier: MIT

//! Test-only builders, available to other crates via the `test-support`
//! feature (mirrors the teacher's `#[cfg(any(test, feature =
//! "test-support"))]` convention so integration tests in downstream
//! crates don't need to hand-roll fixtures).

use crate::clock::FakeClock;
use crate::ids::JobId;
use crate::job::{Job, JobRequirements};

/// Build a `Job` with sane defaults for tests, overriding only what a
/// given test cares about.
pub struct JobFixture {
    pub service_required: String,
    pub priority: i32,
    pub payload: serde_json::Value,
    pub requirements: JobRequirements,
    pub customer_id: Option<String>,
    pub max_retries: i32,
    pub submission_seq: u64,
}

impl Default for JobFixture {
    fn default() -> Self {
        Self {
            service_required: "simulation".to_string(),
            priority: 50,
            payload: serde_json::json!({}),
            requirements: JobRequirements::default(),
            customer_id: None,
            max_retries: 3,
            submission_seq: 0,
        }
    }
}

impl JobFixture {
    pub fn service_required(mut self, v: impl Into<String>) -> Self {
        self.service_required = v.into();
        self
    }

    pub fn priority(mut self, v: i32) -> Self {
        self.priority = v;
        self
    }

    pub fn requirements(mut self, v: JobRequirements) -> Self {
        self.requirements = v;
        self
    }

    pub fn customer_id(mut self, v: impl Into<String>) -> Self {
        self.customer_id = Some(v.into());
        self
    }

    pub fn submission_seq(mut self, v: u64) -> Self {
        self.submission_seq = v;
        self
    }

    pub fn build(self) -> Job {
        let clock = FakeClock::new();
        Job::new(
            JobId::new(),
            self.service_required,
            self.priority,
            self.payload,
            self.requirements,
            self.customer_id,
            self.max_retries,
            self.submission_seq,
            &clock,
        )
    }
}
