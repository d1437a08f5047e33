// SPDX-License-Identifier: MIT

//! Aggregate queue/job counts backing the CM's stats broadcast and
//! the machine/monitor dashboards.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerStats {
    pub pending: u64,
    pub assigned: u64,
    pub in_progress: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}
