// SPDX-License-Identifier: MIT

//! Entity identifiers, all fixed-capacity and opaque to consumers.

crate::define_id! {
    /// Unique identifier for a job.
    pub struct JobId("job-");
}

crate::define_id! {
    /// Unique identifier for a worker instance.
    pub struct WorkerId("wrk-");
}

crate::define_id! {
    /// Unique identifier for a machine (host owning workers/services).
    pub struct MachineId("mch-");
}

crate::define_id! {
    /// Unique identifier for a live WebSocket connection.
    pub struct ConnectionId("con-");
}

crate::define_id! {
    /// Unique identifier for a chunked-message reassembly group.
    pub struct ChunkId("chk-");
}
