// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobmesh-worker: the pull loop that claims jobs, drives them through
//! a connector, and reports progress and outcome back to the broker.

pub mod cli;
pub mod env;
pub mod fake_transport;
pub mod runtime;
pub mod transport;
pub mod ws_transport;

pub use runtime::{Runtime, RuntimeConfig};
pub use transport::{BrokerClient, CancelNotice, TransportError, TransportResult};
