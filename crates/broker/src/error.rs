// SPDX-License-Identifier: MIT

//! Broker-level errors: the union of domain invariant violations,
//! submission validation failures, and the underlying store's own
//! errors (folded in via `#[from]` once the retry budget is spent).

use jobmesh_core::{DomainError, InvalidJob};
use jobmesh_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid job submission: {0}")]
    InvalidJob(#[from] InvalidJob),

    #[error("domain invariant violation: {0}")]
    Domain(#[from] DomainError),

    #[error("job {0} was not found")]
    JobNotFound(String),

    #[error("worker {0} was not found")]
    WorkerNotFound(String),

    #[error("store error after exhausting retry budget: {0}")]
    Store(#[from] StoreError),

    #[error("stored job record was corrupt: {0}")]
    CorruptRecord(String),
}

pub type BrokerResult<T> = Result<T, BrokerError>;
