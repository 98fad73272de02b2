// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Batch State Aggregate
//!
//! Fleet membership and progress of one batch run.
//!
//! # Invariants
//!
//! Between two session tasks:
//!
//! - `active`, `done_agents` and `timedout_agents` are pairwise disjoint.
//! - `active ∪ done_agents ∪ timedout_agents ⊆ live_agents ⊆ targeted_agents`.
//! - `batch_size ≥ 1`.

use fleet_core::domain::agent::AgentId;
use std::collections::BTreeSet;

/// Result of settling one liveness round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LivenessOutcome {
    /// Agents that did not confirm and were moved to `timedout_agents`
    pub timed_out: BTreeSet<AgentId>,
    /// Agents that confirmed they are still running the job
    pub still_running: BTreeSet<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchState {
    /// Agents the transport matched against the target expression
    pub targeted_agents: BTreeSet<AgentId>,
    /// Agents that answered the presence probe
    pub live_agents: BTreeSet<AgentId>,
    /// Agents running the job in a current wave
    pub active: BTreeSet<AgentId>,
    /// Agents whose job return has been observed
    pub done_agents: BTreeSet<AgentId>,
    /// Agents dropped by the liveness checker without a job return
    pub timedout_agents: BTreeSet<AgentId>,
    /// Agents that answered the outstanding liveness polls
    pub liveness_confirmed: BTreeSet<AgentId>,
    /// Wave capacity, resolved once when batching starts
    pub batch_size: usize,
    /// First wave has been scheduled
    pub initialized: bool,
    /// A wave advance is already queued
    pub wave_scheduled: bool,
    /// The done event has been emitted
    pub ended: bool,
}

impl Default for BatchState {
    fn default() -> Self {
        Self {
            targeted_agents: BTreeSet::new(),
            live_agents: BTreeSet::new(),
            active: BTreeSet::new(),
            done_agents: BTreeSet::new(),
            timedout_agents: BTreeSet::new(),
            liveness_confirmed: BTreeSet::new(),
            batch_size: 1,
            initialized: false,
            wave_scheduled: false,
            ended: false,
        }
    }
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Targeted agents that never answered the presence probe.
    pub fn down_agents(&self) -> BTreeSet<AgentId> {
        self.targeted_agents
            .difference(&self.live_agents)
            .cloned()
            .collect()
    }

    /// Every targeted agent has answered the presence probe.
    pub fn discovery_settled(&self) -> bool {
        self.live_agents == self.targeted_agents
    }

    /// Next wave: live agents not yet dispatched or settled, bounded by the
    /// capacity left over from agents still active.
    pub fn compute_next_wave(&self) -> BTreeSet<AgentId> {
        let capacity = self.batch_size.saturating_sub(self.active.len());
        self.live_agents
            .iter()
            .filter(|agent| {
                !self.done_agents.contains(*agent)
                    && !self.active.contains(*agent)
                    && !self.timedout_agents.contains(*agent)
            })
            .take(capacity)
            .cloned()
            .collect()
    }

    /// Nothing is running and every live agent is done or timed out.
    pub fn is_settled(&self) -> bool {
        self.active.is_empty()
            && self
                .live_agents
                .iter()
                .all(|agent| self.done_agents.contains(agent) || self.timedout_agents.contains(agent))
    }

    /// Record a presence-probe answer. Returns `false` for agents outside the
    /// target set.
    pub fn record_presence(&mut self, agent: &AgentId) -> bool {
        if !self.targeted_agents.contains(agent) {
            return false;
        }
        self.live_agents.insert(agent.clone());
        true
    }

    /// Mark agents as dispatched in the current wave.
    pub fn activate(&mut self, wave: &BTreeSet<AgentId>) {
        self.active.extend(wave.iter().cloned());
    }

    /// Undo [`activate`](Self::activate) after a failed dispatch.
    pub fn deactivate(&mut self, wave: &BTreeSet<AgentId>) {
        for agent in wave {
            self.active.remove(agent);
        }
    }

    /// Record a job return. Only agents currently active can complete; a late
    /// return from a timed-out agent is ignored. Returns whether the state changed.
    pub fn record_completion(&mut self, agent: &AgentId) -> bool {
        if !self.active.remove(agent) {
            return false;
        }
        self.liveness_confirmed.remove(agent);
        self.done_agents.insert(agent.clone());
        true
    }

    /// Record a liveness confirmation. Agents already done or timed out are
    /// never polled again, so their confirmations are dropped.
    pub fn record_liveness(&mut self, agent: &AgentId) {
        if self.done_agents.contains(agent) || self.timedout_agents.contains(agent) {
            return;
        }
        self.liveness_confirmed.insert(agent.clone());
    }

    /// Agents of `subset` still worth polling: neither done nor timed out.
    pub fn unsettled(&self, subset: &BTreeSet<AgentId>) -> BTreeSet<AgentId> {
        subset
            .iter()
            .filter(|agent| !self.done_agents.contains(*agent) && !self.timedout_agents.contains(*agent))
            .cloned()
            .collect()
    }

    /// Settle one liveness round over `subset`.
    ///
    /// Unsettled agents that confirmed keep their slot and have their
    /// confirmation cleared for the next round; the rest time out.
    pub fn settle_liveness_round(&mut self, subset: &BTreeSet<AgentId>) -> LivenessOutcome {
        let mut outcome = LivenessOutcome::default();
        for agent in self.unsettled(subset) {
            if self.liveness_confirmed.remove(&agent) {
                outcome.still_running.insert(agent);
            } else {
                self.active.remove(&agent);
                self.timedout_agents.insert(agent.clone());
                outcome.timed_out.insert(agent);
            }
        }
        outcome
    }

    /// Describe the first violated invariant, if any.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if let Some(agent) = self.active.intersection(&self.done_agents).next() {
            return Err(format!("{} is both active and done", agent));
        }
        if let Some(agent) = self.active.intersection(&self.timedout_agents).next() {
            return Err(format!("{} is both active and timed out", agent));
        }
        if let Some(agent) = self.done_agents.intersection(&self.timedout_agents).next() {
            return Err(format!("{} is both done and timed out", agent));
        }
        let settled_or_running = self
            .active
            .iter()
            .chain(&self.done_agents)
            .chain(&self.timedout_agents);
        for agent in settled_or_running {
            if !self.live_agents.contains(agent) {
                return Err(format!("{} is tracked but was never live", agent));
            }
        }
        if let Some(agent) = self.live_agents.difference(&self.targeted_agents).next() {
            return Err(format!("{} is live but was not targeted", agent));
        }
        Ok(())
    }
}
