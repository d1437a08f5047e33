// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobmesh-machine: samples the workers running on one machine and
//! publishes a compact status snapshot on a change-driven cadence.

pub mod aggregator;
pub mod cli;
pub mod env;
pub mod probe;

pub use aggregator::{Aggregator, AggregatorConfig};
pub use probe::{SssWorkerProbe, WorkerProbe, WorkerSample};
