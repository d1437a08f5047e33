// SPDX-License-Identifier: MIT

//! Connection kinds shared between the API process's connection manager
//! and the domain. The live socket object itself is owned exclusively
//! by the Connection Manager and never crosses this boundary — only
//! the classification and bookkeeping fields do.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    Worker,
    Client,
    Monitor,
}

crate::simple_display! {
    ConnectionKind {
        Worker => "worker",
        Client => "client",
        Monitor => "monitor",
    }
}

/// Bookkeeping for one live connection, independent of the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: String,
    pub kind: ConnectionKind,
    pub worker_id: Option<String>,
    pub client_id: Option<String>,
    pub connected_at: i64,
    pub last_activity: i64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub alive: bool,
}

impl ConnectionInfo {
    pub fn new(id: impl Into<String>, kind: ConnectionKind, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            kind,
            worker_id: None,
            client_id: None,
            connected_at: now_ms,
            last_activity: now_ms,
            bytes_sent: 0,
            bytes_received: 0,
            messages_sent: 0,
            messages_received: 0,
            alive: true,
        }
    }

    pub fn is_stale(&self, now_ms: i64, timeout_ms: i64) -> bool {
        !self.alive || now_ms.saturating_sub(self.last_activity) >= timeout_ms
    }
}
