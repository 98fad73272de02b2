// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Batch Events
//!
//! Inbound events the session reacts to, and the lifecycle events it emits.

use fleet_core::domain::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Which handler a subscribed return pattern feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Presence probe answers (`ping_job_id`)
    PresenceReturn,
    /// Returns of the dispatched job (`batch_job_id`)
    BatchReturn,
    /// Liveness poll answers (one pattern per round)
    LivenessReturn,
}

/// A bus event after routing, ready to be applied to the batch state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    PresenceReturn { agent: AgentId },
    BatchReturn { agent: AgentId },
    LivenessReturn { agent: AgentId, confirmed: bool },
}

impl BatchEvent {
    pub fn agent(&self) -> &AgentId {
        match self {
            Self::PresenceReturn { agent }
            | Self::BatchReturn { agent }
            | Self::LivenessReturn { agent, .. } => agent,
        }
    }
}

/// Payload of `batch/<jid>/start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStarted {
    pub available_agents: BTreeSet<AgentId>,
    pub down_agents: BTreeSet<AgentId>,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Payload of `batch/<jid>/done`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDone {
    pub available_agents: BTreeSet<AgentId>,
    pub done_agents: BTreeSet<AgentId>,
    pub down_agents: BTreeSet<AgentId>,
    pub timedout_agents: BTreeSet<AgentId>,
    pub metadata: HashMap<String, serde_json::Value>,
}
