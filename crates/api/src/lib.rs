// SPDX-License-Identifier: MIT

#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! jobmesh-api: the connection fabric. Terminates every worker,
//! client, and monitor connection; the Connection Manager tracks who
//! is plugged in, the Message Handler turns their messages into
//! Broker calls, and the Progress Stream Fabric tails per-job progress
//! streams for SSE and WebSocket subscribers.

pub mod cli;
pub mod cm;
pub mod env;
pub mod error;
pub mod fabric;
pub mod http;
pub mod mh;
pub mod state;
pub mod ws;

pub use cm::{ConnectionManager, ReassemblyBuffer};
pub use error::{ApiError, ApiResult};
pub use fabric::Fabric;
pub use state::{ApiConfig, AppState};

use jobmesh_core::Clock;
use jobmesh_store::Sss;

/// The full router: REST routes plus WebSocket upgrade routes, with
/// `tower-http` request tracing over everything.
pub fn app<S: Sss + 'static, C: Clock + 'static>(state: AppState<S, C>) -> axum::Router {
    axum::Router::new()
        .merge(http::router())
        .merge(ws::router())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}
