// SPDX-License-Identifier: MIT

//! Shared application state handed to every axum handler.

use std::sync::Arc;

use jobmesh_broker::Broker;
use jobmesh_core::Clock;
use jobmesh_store::Sss;

use crate::cm::ConnectionManager;
use crate::fabric::Fabric;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub heartbeat_interval_ms: i64,
    /// A worker/client connection idle longer than this is evicted by
    /// the `cleanup_stale` interval task.
    pub connection_timeout_ms: i64,
    /// How often the stats-broadcast interval task aggregates and
    /// publishes `Payload::StatsBroadcast` to monitor connections.
    pub stats_interval_ms: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { heartbeat_interval_ms: 10_000, connection_timeout_ms: 30_000, stats_interval_ms: 5_000 }
    }
}

/// `S` is wrapped in `Arc` before this type is built, so the Broker and
/// the Fabric share one underlying store connection: `Broker<Arc<S>,
/// C>` owns a clone of the same handle the Fabric subscribes through.
#[derive(Clone)]
pub struct AppState<S: Sss, C: Clock> {
    pub broker: Arc<Broker<Arc<S>, C>>,
    pub sss: Arc<S>,
    pub clock: C,
    pub cm: Arc<ConnectionManager>,
    pub fabric: Arc<Fabric<S>>,
    pub config: Arc<ApiConfig>,
}

impl<S: Sss + 'static, C: Clock> AppState<S, C> {
    pub fn new(sss: Arc<S>, clock: C, config: ApiConfig) -> Self {
        let broker = Arc::new(Broker::new(sss.clone(), clock.clone()));
        let fabric = Arc::new(Fabric::new(sss.clone()));
        Self { broker, sss, clock, cm: Arc::new(ConnectionManager::new()), fabric, config: Arc::new(config) }
    }
}
