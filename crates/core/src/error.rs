// SPDX-License-Identifier: MIT

//! Shared error kinds.

use thiserror::Error;

/// Errors raised by domain-level state transitions (invariant violations).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("job is already in a terminal state: {status}")]
    AlreadyTerminal { status: String },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("retry budget exceeded: {retry_count}/{max_retries}")]
    RetryBudgetExceeded { retry_count: i32, max_retries: i32 },
}

pub type DomainResult<T> = Result<T, DomainError>;

/// Validation errors for inbound submissions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidJob {
    #[error("service_required is missing or empty")]
    MissingServiceRequired,

    #[error("priority {0} is out of range 0..=100")]
    PriorityOutOfRange(i32),

    #[error("requirements are malformed: {0}")]
    MalformedRequirements(String),
}

/// Top-level error aggregating every failure mode this crate itself
/// can produce. Downstream crates (store, broker, api, ...) define
/// their own top-level error and fold this one in via `#[from]`,
/// rather than this crate reaching forward into theirs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobmeshError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("invalid job submission: {0}")]
    InvalidJob(#[from] InvalidJob),
}
