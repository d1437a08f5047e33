// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobmesh-connectors: the pluggable backends a worker drives jobs
//! through. Every connector implements [`Connector`]; the worker
//! runtime owns selection, concurrency, and lifecycle.

pub mod a1111;
pub mod comfyui;
pub mod connector;
pub mod error;
pub mod openai;
pub mod registry;
pub mod simulation;

pub use a1111::{A1111Config, A1111Connector};
pub use comfyui::{ComfyUiConfig, ComfyUiConnector};
pub use connector::{Connector, ConnectorCapabilities, NullProgressSink, ProgressSink};
pub use error::{ConnectorError, ConnectorResult};
pub use openai::{OpenAiConfig, OpenAiConnector};
pub use registry::ConnectorRegistry;
pub use simulation::{SimulationConfig, SimulationConnector};
