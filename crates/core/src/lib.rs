// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobmesh-core: domain types shared by every other crate in the workspace.
//!
//! This crate has no I/O. It defines the job/worker/machine/connection
//! data model and state machine, plus the small utility layer (ids,
//! clock, error kinds, macros) the rest of the workspace builds on.

pub mod macros;

pub mod clock;
pub mod connection;
pub mod error;
pub mod fatal;
pub mod id;
pub mod ids;
pub mod job;
pub mod machine;
pub mod progress;
pub mod worker;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use clock::{Clock, FakeClock, SystemClock};
pub use connection::{ConnectionInfo, ConnectionKind};
pub use error::{DomainError, DomainResult, InvalidJob, JobmeshError};
pub use id::{short, IdBuf};
pub use ids::{ChunkId, ConnectionId, JobId, MachineId, WorkerId};
pub use job::{
    CustomerIsolation, HardwareRequirements, Job, JobRequirements, JobStatus, WorkerCapabilities,
};
pub use machine::{MachineSnapshot, MachineStatus, ServiceHealth, WorkerSummary};
pub use progress::ProgressFrame;
pub use worker::{WorkerRecord, WorkerStatus};
