// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::state::BatchState;
use fleet_core::domain::agent::AgentId;
use fleet_core::domain::job::JobId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Every live agent finished or timed out and the done event was emitted
    Completed,
    /// The session was cancelled before settling
    Cancelled,
}

/// Final view of a batch run, returned by `BatchSession::run`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_jid: JobId,
    pub status: BatchStatus,
    pub batch_size: usize,
    pub targeted_agents: BTreeSet<AgentId>,
    pub available_agents: BTreeSet<AgentId>,
    pub done_agents: BTreeSet<AgentId>,
    pub down_agents: BTreeSet<AgentId>,
    pub timedout_agents: BTreeSet<AgentId>,
    /// Agents still running when the session was cancelled
    pub active_agents: BTreeSet<AgentId>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl BatchReport {
    pub fn from_state(
        batch_jid: JobId,
        status: BatchStatus,
        state: &BatchState,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            batch_jid,
            status,
            batch_size: state.batch_size,
            targeted_agents: state.targeted_agents.clone(),
            available_agents: state.live_agents.clone(),
            done_agents: state.done_agents.clone(),
            down_agents: state.down_agents(),
            timedout_agents: state.timedout_agents.clone(),
            active_agents: state.active.clone(),
            metadata,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == BatchStatus::Completed
    }
}
