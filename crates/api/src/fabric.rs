// SPDX-License-Identifier: MIT

//! Progress Stream Fabric: one subscriber task per API process that
//! watches every job's progress stream via keyspace notifications and
//! fans each new frame out to whoever is currently interested, without
//! every SSE/WS consumer opening its own subscription against the
//! store.
//!
//! Backed directly by [`Sss::psubscribe`]/[`Sss::xrevrange`] against
//! the same store instance the Broker writes through — not through
//! the Broker, since the Broker's interface is job-lifecycle intent,
//! not raw stream tailing.

use std::collections::HashMap;
use std::sync::Arc;

use jobmesh_core::ProgressFrame;
use jobmesh_store::Sss;
use tokio::sync::{mpsc, RwLock};
use tracing::warn;

const SUBSCRIBER_QUEUE_DEPTH: usize = 16;

/// Glob pattern a real Redis deployment must be configured to emit
/// keyspace events for (`notify-keyspace-events` including stream
/// commands); `MemorySss` emulates the same notifications in-process.
pub const PROGRESS_KEYSPACE_PATTERN: &str = "__keyspace@*__:progress:*";

fn job_id_from_key(key: &str) -> Option<&str> {
    key.rsplit_once(':').map(|(_, id)| id).filter(|id| !id.is_empty())
}

pub struct Fabric<S: Sss> {
    sss: Arc<S>,
    subscribers: Arc<RwLock<HashMap<String, Vec<mpsc::Sender<ProgressFrame>>>>>,
}

impl<S: Sss + 'static> Fabric<S> {
    pub fn new(sss: Arc<S>) -> Self {
        Self { sss, subscribers: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Register interest in one job's progress frames. The returned
    /// receiver yields frames in arrival order for as long as the
    /// caller holds it; dropping it unsubscribes on the next publish.
    pub async fn subscribe(&self, job_id: &str) -> mpsc::Receiver<ProgressFrame> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.subscribers.write().await.entry(job_id.to_string()).or_default().push(tx);
        rx
    }

    /// Drive the fabric until the store's keyspace subscription ends.
    /// Intended to run for the lifetime of the API process.
    pub async fn run(self: Arc<Self>) {
        let mut notifications = match self.sss.psubscribe(PROGRESS_KEYSPACE_PATTERN).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "progress fabric failed to subscribe to keyspace notifications");
                return;
            }
        };

        while let Some((key, _event)) = notifications.recv().await {
            let Some(job_id) = job_id_from_key(&key) else { continue };
            let stream_key = format!("progress:{job_id}");
            let Ok(entries) = self.sss.xrevrange(&stream_key, 1).await else { continue };
            let Some(entry) = entries.into_iter().next() else { continue };
            let Some(raw) = entry.fields.get("data") else { continue };
            let Ok(frame) = serde_json::from_str::<ProgressFrame>(raw) else { continue };

            let mut table = self.subscribers.write().await;
            if let Some(subs) = table.get_mut(job_id) {
                subs.retain(|tx| tx.try_send(frame.clone()).is_ok() || !tx.is_closed());
                if subs.is_empty() {
                    table.remove(job_id);
                }
            }
        }
    }
}
