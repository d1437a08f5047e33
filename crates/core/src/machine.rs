// SPDX-License-Identifier: MIT

//! Machine domain model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineStatus {
    Starting,
    Ready,
    Degraded,
    Shutdown,
}

crate::simple_display! {
    MachineStatus {
        Starting => "starting",
        Ready => "ready",
        Degraded => "degraded",
        Shutdown => "shutdown",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceHealth {
    Up,
    Down,
    Unknown,
}

/// Compact per-worker summary embedded in a machine snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub worker_id: String,
    pub status: String,
    pub active_jobs: usize,
}

/// A machine's published, compact status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineSnapshot {
    pub machine_id: String,
    pub status: MachineStatus,
    pub services: HashMap<String, ServiceHealth>,
    pub workers: Vec<WorkerSummary>,
    pub uptime_secs: u64,
    pub sampled_at: i64,
}

impl MachineSnapshot {
    pub fn shutdown(machine_id: impl Into<String>, uptime_secs: u64, sampled_at: i64) -> Self {
        Self {
            machine_id: machine_id.into(),
            status: MachineStatus::Shutdown,
            services: HashMap::new(),
            workers: Vec::new(),
            uptime_secs,
            sampled_at,
        }
    }

    /// Overall status is the worst of any service/worker state, matching
    /// the teacher's pattern of deriving a rolled-up health from parts
    /// rather than tracking it independently (avoids drift).
    pub fn derive_status(services: &HashMap<String, ServiceHealth>, has_workers: bool) -> MachineStatus {
        if services.values().any(|h| matches!(h, ServiceHealth::Down)) {
            return MachineStatus::Degraded;
        }
        if !has_workers {
            return MachineStatus::Degraded;
        }
        MachineStatus::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_degraded_when_any_service_is_down() {
        let mut services = HashMap::new();
        services.insert("comfyui".to_string(), ServiceHealth::Down);
        assert_eq!(MachineSnapshot::derive_status(&services, true), MachineStatus::Degraded);
    }

    #[test]
    fn status_is_ready_when_all_services_up_and_workers_present() {
        let mut services = HashMap::new();
        services.insert("comfyui".to_string(), ServiceHealth::Up);
        assert_eq!(MachineSnapshot::derive_status(&services, true), MachineStatus::Ready);
    }

    #[test]
    fn status_is_degraded_with_no_workers() {
        let services = HashMap::new();
        assert_eq!(MachineSnapshot::derive_status(&services, false), MachineStatus::Degraded);
    }
}
