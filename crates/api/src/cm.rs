// SPDX-License-Identifier: MIT

//! Connection Manager: per-kind registries of live WebSocket
//! connections, keyed by the peer's self-reported id. Owns nothing
//! about domain state — it only knows who is plugged in and how to
//! reach them, mirroring the teacher's listener connection table.
//!
//! Two delivery lanes per connection: a bounded, ordered `control`
//! queue for messages that must all arrive (acks, job assignment,
//! state transitions), and a coalescing `progress` mailbox for
//! high-frequency progress frames, where a lagging reader only ever
//! needs the latest value and earlier ones are fine to drop.

use std::collections::HashMap;
use std::sync::Arc;

use jobmesh_core::{ConnectionInfo, ConnectionKind, WorkerCapabilities};
use jobmesh_wire::{chunk, Envelope, Payload};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::warn;

/// Frames whose JSON encoding exceeds this size are split via the
/// chunk codec rather than sent as one oversized WebSocket message.
pub const CHUNK_THRESHOLD_BYTES: usize = 48 * 1024;
pub const CHUNK_SIZE_BYTES: usize = 16 * 1024;

const CONTROL_QUEUE_DEPTH: usize = 32;

fn is_progress_class(payload: &Payload) -> bool {
    matches!(payload, Payload::ProgressUpdate { .. })
}

/// A single-slot mailbox that always holds the most recently
/// published value. Publishing overwrites whatever was there,
/// which is the drop-oldest policy progress traffic wants.
struct LatestMailbox {
    slot: Mutex<Option<Envelope>>,
    notify: Notify,
}

impl LatestMailbox {
    fn new() -> Self {
        Self { slot: Mutex::new(None), notify: Notify::new() }
    }

    fn publish(&self, envelope: Envelope) {
        *self.slot.lock() = Some(envelope);
        self.notify.notify_one();
    }

    async fn recv(&self) -> Envelope {
        loop {
            if let Some(envelope) = self.slot.lock().take() {
                return envelope;
            }
            self.notify.notified().await;
        }
    }
}

pub struct Connection {
    pub info: Mutex<ConnectionInfo>,
    control: mpsc::Sender<Envelope>,
    progress: Arc<LatestMailbox>,
    capabilities: Mutex<Option<WorkerCapabilities>>,
}

impl Connection {
    /// Deliver one outbound frame, chunking it first if it's too
    /// large for a single WebSocket message. Each fragment carries its
    /// own base64-encoded slice of the encoded envelope so the peer's
    /// reassembly buffer can rebuild the original bytes; because
    /// reassembly needs every fragment to arrive, fragments always go
    /// out on the control lane even when the original message would
    /// otherwise be progress-class.
    async fn deliver(&self, payload: Payload, now_ms: i64) -> bool {
        let progress_class = is_progress_class(&payload);
        let envelope = Envelope::new(payload, now_ms);
        let Ok(encoded) = serde_json::to_vec(&envelope) else { return false };
        if encoded.len() <= CHUNK_THRESHOLD_BYTES {
            return self.send_one(envelope, progress_class).await;
        }
        let chunk_id = envelope.id.to_string();
        let mut all_sent = true;
        for fragment in chunk::split(chunk_id, &encoded, CHUNK_SIZE_BYTES) {
            let data = chunk::encode_fragment(&fragment.data);
            let mut fragment_envelope = Envelope::new(Payload::ChunkFragment { data }, now_ms);
            fragment_envelope.chunk_info = Some(fragment.info);
            all_sent &= self.send_one(fragment_envelope, false).await;
        }
        all_sent
    }

    async fn send_one(&self, envelope: Envelope, progress_class: bool) -> bool {
        if progress_class {
            self.progress.publish(envelope);
            return true;
        }
        match self.control.try_send(envelope) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection_id = %self.info.lock().id, "control queue full, dropping frame");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Wait for the next outbound frame on either lane, whichever
    /// arrives first. Used by the per-connection writer task.
    pub async fn next_outbound(&self, control_rx: &mut mpsc::Receiver<Envelope>) -> Option<Envelope> {
        tokio::select! {
            envelope = control_rx.recv() => envelope,
            envelope = self.progress.recv() => Some(envelope),
        }
    }

    /// Record that a frame arrived from this peer, refreshing the
    /// staleness clock `cleanup_stale` reads.
    pub fn mark_activity(&self, now_ms: i64) {
        let mut info = self.info.lock();
        info.last_activity = now_ms;
        info.messages_received += 1;
    }
}

/// Fragments awaiting the rest of their set, keyed by `chunk_id`.
struct PendingChunkSet {
    slots: Vec<Option<chunk::Chunk>>,
    created_at_ms: i64,
}

/// Reassembles [`Payload::ChunkFragment`] envelopes back into the
/// original message. One buffer per peer is enough since chunk ids are
/// unique to the envelope that was split.
pub struct ReassemblyBuffer {
    pending: Mutex<HashMap<String, PendingChunkSet>>,
    max_age_ms: i64,
}

impl ReassemblyBuffer {
    pub fn new(max_age_ms: i64) -> Self {
        Self { pending: Mutex::new(HashMap::new()), max_age_ms }
    }

    /// Feed one inbound envelope in. Returns `Some` with the
    /// reconstructed original envelope once every fragment for its
    /// `chunk_id` has arrived and the digest checks out; non-fragment
    /// envelopes pass straight through unchanged.
    pub fn accept(&self, envelope: Envelope, now_ms: i64) -> Option<Envelope> {
        let Payload::ChunkFragment { data } = &envelope.payload else {
            return Some(envelope);
        };
        let Some(info) = envelope.chunk_info.clone() else {
            return Some(envelope);
        };
        let bytes = match chunk::decode_fragment(data) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, chunk_id = %info.chunk_id, "dropping chunk fragment with bad encoding");
                return None;
            }
        };

        let mut pending = self.pending.lock();
        pending.retain(|_, set| now_ms - set.created_at_ms <= self.max_age_ms);

        let set = pending.entry(info.chunk_id.clone()).or_insert_with(|| PendingChunkSet {
            slots: vec![None; info.total_chunks as usize],
            created_at_ms: now_ms,
        });
        if let Some(slot) = set.slots.get_mut(info.chunk_index as usize) {
            *slot = Some(chunk::Chunk { info: info.clone(), data: bytes });
        }
        if !set.slots.iter().all(Option::is_some) {
            return None;
        }

        let set = match pending.remove(&info.chunk_id) {
            Some(set) => set,
            None => return None,
        };
        drop(pending);

        let chunks: Vec<chunk::Chunk> = set.slots.into_iter().flatten().collect();
        match chunk::reassemble(chunks) {
            Ok(bytes) => match serde_json::from_slice::<Envelope>(&bytes) {
                Ok(reconstructed) => Some(reconstructed),
                Err(e) => {
                    warn!(error = %e, chunk_id = %info.chunk_id, "reassembled bytes are not a valid envelope");
                    None
                }
            },
            Err(e) => {
                warn!(error = %e, chunk_id = %info.chunk_id, "chunk reassembly failed");
                None
            }
        }
    }
}

#[derive(Default)]
pub struct ConnectionManager {
    workers: RwLock<HashMap<String, Arc<Connection>>>,
    clients: RwLock<HashMap<String, Arc<Connection>>>,
    monitors: RwLock<HashMap<String, Arc<Connection>>>,
}

type Table = RwLock<HashMap<String, Arc<Connection>>>;

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, kind: ConnectionKind) -> &Table {
        match kind {
            ConnectionKind::Worker => &self.workers,
            ConnectionKind::Client => &self.clients,
            ConnectionKind::Monitor => &self.monitors,
        }
    }

    /// Register a new connection. The returned receiver is the writer
    /// task's control-lane feed; take it exactly once.
    pub async fn register(&self, kind: ConnectionKind, id: impl Into<String>, now_ms: i64) -> (Arc<Connection>, mpsc::Receiver<Envelope>) {
        let id = id.into();
        let (tx, rx) = mpsc::channel(CONTROL_QUEUE_DEPTH);
        let conn = Arc::new(Connection {
            info: Mutex::new(ConnectionInfo::new(id.clone(), kind, now_ms)),
            control: tx,
            progress: Arc::new(LatestMailbox::new()),
            capabilities: Mutex::new(None),
        });
        self.table(kind).write().await.insert(id, conn.clone());
        (conn, rx)
    }

    pub async fn unregister(&self, kind: ConnectionKind, id: &str) {
        self.table(kind).write().await.remove(id);
    }

    pub async fn get(&self, kind: ConnectionKind, id: &str) -> Option<Arc<Connection>> {
        self.table(kind).read().await.get(id).cloned()
    }

    pub async fn send_to(&self, kind: ConnectionKind, id: &str, payload: Payload, now_ms: i64) -> bool {
        match self.get(kind, id).await {
            Some(conn) => conn.deliver(payload, now_ms).await,
            None => false,
        }
    }

    pub async fn broadcast(&self, kind: ConnectionKind, payload: Payload, now_ms: i64) {
        let targets: Vec<Arc<Connection>> = self.table(kind).read().await.values().cloned().collect();
        for conn in targets {
            conn.deliver(payload.clone(), now_ms).await;
        }
    }

    pub async fn connection_count(&self, kind: ConnectionKind) -> usize {
        self.table(kind).read().await.len()
    }

    /// Store a worker's advertised capabilities against its live
    /// connection so routing decisions elsewhere can read them back
    /// without another round trip to the worker. A no-op if the worker
    /// isn't currently connected.
    pub async fn register_worker_capabilities(&self, worker_id: &str, capabilities: WorkerCapabilities) {
        if let Some(conn) = self.get(ConnectionKind::Worker, worker_id).await {
            *conn.capabilities.lock() = Some(capabilities);
        }
    }

    pub async fn worker_capabilities(&self, worker_id: &str) -> Option<WorkerCapabilities> {
        self.get(ConnectionKind::Worker, worker_id).await.and_then(|conn| conn.capabilities.lock().clone())
    }

    /// Issue an application-level [`Payload::Ping`] to every worker and
    /// client connection. Liveness is also driven by the transport's own
    /// socket pong; this is the half of it the Connection Manager
    /// controls directly.
    pub async fn ping_all(&self, now_ms: i64) -> PingReport {
        PingReport {
            workers_pinged: self.ping_table(ConnectionKind::Worker, now_ms).await,
            clients_pinged: self.ping_table(ConnectionKind::Client, now_ms).await,
        }
    }

    async fn ping_table(&self, kind: ConnectionKind, now_ms: i64) -> usize {
        let targets: Vec<Arc<Connection>> = self.table(kind).read().await.values().cloned().collect();
        let mut pinged = 0;
        for conn in &targets {
            if conn.deliver(Payload::Ping, now_ms).await {
                pinged += 1;
            }
        }
        pinged
    }

    /// Evict every worker/client connection that has gone quiet for
    /// longer than `timeout_ms`. Returns the evicted ids so the caller
    /// can run the orphan-release path against the broker; the
    /// Connection Manager itself owns no domain state to release.
    pub async fn cleanup_stale(&self, now_ms: i64, timeout_ms: i64) -> CleanupReport {
        CleanupReport {
            evicted_workers: self.evict_stale(ConnectionKind::Worker, now_ms, timeout_ms).await,
            evicted_clients: self.evict_stale(ConnectionKind::Client, now_ms, timeout_ms).await,
        }
    }

    async fn evict_stale(&self, kind: ConnectionKind, now_ms: i64, timeout_ms: i64) -> Vec<String> {
        let mut table = self.table(kind).write().await;
        let stale_ids: Vec<String> =
            table.iter().filter(|(_, conn)| conn.info.lock().is_stale(now_ms, timeout_ms)).map(|(id, _)| id.clone()).collect();
        for id in &stale_ids {
            table.remove(id);
        }
        stale_ids
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PingReport {
    pub workers_pinged: usize,
    pub clients_pinged: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub evicted_workers: Vec<String>,
    pub evicted_clients: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn registering_then_sending_reaches_the_writer_task() {
        let cm = ConnectionManager::new();
        let (conn, mut rx) = cm.register(ConnectionKind::Worker, "wrk-1", 0).await;
        assert!(cm.send_to(ConnectionKind::Worker, "wrk-1", Payload::Ack { ok: true }, 1).await);
        let envelope = conn.next_outbound(&mut rx).await.expect("a frame");
        assert!(matches!(envelope.payload, Payload::Ack { ok: true }));
    }

    #[tokio::test]
    async fn progress_frames_coalesce_to_the_latest() {
        let cm = ConnectionManager::new();
        let (conn, mut rx) = cm.register(ConnectionKind::Client, "cli-1", 0).await;
        for pct in [10.0, 20.0, 30.0] {
            cm.send_to(
                ConnectionKind::Client,
                "cli-1",
                Payload::ProgressUpdate { job_id: "job-1".into(), progress_pct: pct, message: String::new() },
                1,
            )
            .await;
        }
        let envelope = conn.next_outbound(&mut rx).await.expect("a frame");
        match envelope.payload {
            Payload::ProgressUpdate { progress_pct, .. } => assert_eq!(progress_pct, 30.0),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unregistering_makes_sends_a_no_op() {
        let cm = ConnectionManager::new();
        let (_conn, _rx) = cm.register(ConnectionKind::Monitor, "mon-1", 0).await;
        cm.unregister(ConnectionKind::Monitor, "mon-1").await;
        assert!(!cm.send_to(ConnectionKind::Monitor, "mon-1", Payload::Pong, 1).await);
    }

    #[tokio::test]
    async fn oversized_frame_is_split_into_reassembling_fragments() {
        let cm = ConnectionManager::new();
        let (conn, mut rx) = cm.register(ConnectionKind::Monitor, "mon-2", 0).await;
        let jobs: Vec<serde_json::Value> =
            (0..4000).map(|n| serde_json::json!({ "job_id": format!("job-{n}") })).collect();
        let original =
            Payload::FullStateSnapshot { jobs: jobs.clone(), workers: Vec::new(), machines: Vec::new() };
        assert!(cm.send_to(ConnectionKind::Monitor, "mon-2", original.clone(), 1).await);

        let buffer = ReassemblyBuffer::new(60_000);
        let mut reconstructed = None;
        let mut fragments_seen = 0;
        while reconstructed.is_none() {
            let envelope = conn.next_outbound(&mut rx).await.expect("a fragment");
            assert!(matches!(envelope.payload, Payload::ChunkFragment { .. }));
            fragments_seen += 1;
            reconstructed = buffer.accept(envelope, 1);
        }
        assert!(fragments_seen > 1, "large payload should have been split into multiple fragments");
        let reconstructed = reconstructed.expect("reassembled envelope");
        assert_eq!(reconstructed.payload, original);
    }

    #[tokio::test]
    async fn reassembly_buffer_passes_unchunked_envelopes_through() {
        let buffer = ReassemblyBuffer::new(60_000);
        let envelope = Envelope::new(Payload::Ack { ok: true }, 1);
        let passed = buffer.accept(envelope.clone(), 1).expect("unchunked envelope passes through");
        assert_eq!(passed.payload, envelope.payload);
    }

    #[tokio::test]
    async fn ping_all_reaches_workers_and_clients_but_not_monitors() {
        let cm = ConnectionManager::new();
        let (_worker, mut worker_rx) = cm.register(ConnectionKind::Worker, "wrk-1", 0).await;
        let (_client, mut client_rx) = cm.register(ConnectionKind::Client, "cli-1", 0).await;
        let (_monitor, mut monitor_rx) = cm.register(ConnectionKind::Monitor, "mon-1", 0).await;

        let report = cm.ping_all(1).await;
        assert_eq!(report.workers_pinged, 1);
        assert_eq!(report.clients_pinged, 1);

        assert!(worker_rx.try_recv().is_ok());
        assert!(client_rx.try_recv().is_ok());
        assert!(monitor_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cleanup_stale_evicts_quiet_connections_and_leaves_active_ones() {
        let cm = ConnectionManager::new();
        let (quiet, _rx1) = cm.register(ConnectionKind::Worker, "wrk-quiet", 0).await;
        let (active, _rx2) = cm.register(ConnectionKind::Worker, "wrk-active", 0).await;
        active.mark_activity(9_000);
        let _ = quiet;

        let report = cm.cleanup_stale(10_000, 5_000).await;
        assert_eq!(report.evicted_workers, vec!["wrk-quiet".to_string()]);
        assert!(cm.get(ConnectionKind::Worker, "wrk-quiet").await.is_none());
        assert!(cm.get(ConnectionKind::Worker, "wrk-active").await.is_some());
    }

    #[tokio::test]
    async fn register_worker_capabilities_is_readable_back_and_a_noop_for_unknown_workers() {
        let cm = ConnectionManager::new();
        let (_conn, _rx) = cm.register(ConnectionKind::Worker, "wrk-1", 0).await;
        let caps = jobmesh_core::WorkerCapabilities {
            service_tags: std::collections::HashSet::from(["comfyui".to_string()]),
            ..Default::default()
        };
        cm.register_worker_capabilities("wrk-1", caps.clone()).await;
        assert_eq!(cm.worker_capabilities("wrk-1").await, Some(caps));

        cm.register_worker_capabilities("ghost", WorkerCapabilities::default()).await;
        assert_eq!(cm.worker_capabilities("ghost").await, None);
    }

    #[tokio::test]
    async fn reassembly_buffer_expires_stale_partial_sets() {
        let buffer = ReassemblyBuffer::new(100);
        let chunks = chunk::split("chk-x", b"some payload bytes to split up", 4);
        let mut first = chunks.into_iter().next().expect("at least one chunk");
        first.info.total_chunks = 2; // pretend a second fragment never arrives
        let mut envelope =
            Envelope::new(Payload::ChunkFragment { data: chunk::encode_fragment(&first.data) }, 0);
        envelope.chunk_info = Some(first.info);
        assert!(buffer.accept(envelope, 0).is_none());
        // advancing well past max_age_ms sweeps the stale partial set out
        assert!(buffer.accept(Envelope::new(Payload::Pong, 1_000), 1_000).is_some());
    }
}
