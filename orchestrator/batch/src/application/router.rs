// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Event Router
//!
//! Single entry point for inbound bus events. A concrete
//! `job/<jid>/return/<agent>` tag is matched against the session's pattern
//! table and turned into a [`BatchEvent`], which is then applied to the state.
//! Nothing else adds agents to `done_agents`.

use super::queue::Task;
use super::session::BatchSession;
use crate::domain::events::{BatchEvent, HandlerKind};
use fleet_core::domain::bus::{parse_job_return_tag, BusEvent, JobReturn};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

impl BatchSession {
    /// Classify a bus event. Unrecognized tags yield `None`.
    pub(crate) fn route(&self, event: &BusEvent) -> Option<BatchEvent> {
        let kind = self.resources.as_ref()?.handler_for(&event.tag)?;
        let (_, tag_agent) = parse_job_return_tag(&event.tag)?;
        let (agent, ret) = match JobReturn::deserialize(&event.data) {
            Ok(payload) => (payload.id, payload.ret),
            Err(_) => (tag_agent, Value::Null),
        };

        Some(match kind {
            HandlerKind::PresenceReturn => BatchEvent::PresenceReturn { agent },
            HandlerKind::BatchReturn => BatchEvent::BatchReturn { agent },
            HandlerKind::LivenessReturn => BatchEvent::LivenessReturn {
                agent,
                confirmed: is_truthy(&ret),
            },
        })
    }

    pub(crate) fn handle_event(&mut self, event: BusEvent) {
        let Some(routed) = self.route(&event) else {
            trace!(tag = %event.tag, "Ignoring unrelated bus event");
            return;
        };
        self.apply(routed);
    }

    pub(crate) fn apply(&mut self, event: BatchEvent) {
        match event {
            BatchEvent::PresenceReturn { agent } => {
                if self.state.initialized {
                    debug!(%agent, "Presence return after discovery ended; ignoring");
                    return;
                }
                if !self.state.record_presence(&agent) {
                    debug!(%agent, "Presence return from untargeted agent; ignoring");
                    return;
                }
                if self.state.discovery_settled() {
                    debug!(live = self.state.live_agents.len(), "Every targeted agent answered the probe");
                    self.queue.spawn_callback(Task::StartBatch);
                }
            }
            BatchEvent::BatchReturn { agent } => {
                if self.state.record_completion(&agent) {
                    debug!(%agent, done = self.state.done_agents.len(), "Agent finished the batch job");
                    self.queue.spawn_callback(Task::ScheduleNext);
                } else {
                    debug!(%agent, "Batch return from inactive agent; ignoring");
                }
            }
            BatchEvent::LivenessReturn { agent, confirmed } => {
                if confirmed {
                    self.state.record_liveness(&agent);
                }
            }
        }
    }
}

/// A liveness answer counts only if it carries something: an agent that no
/// longer runs the job answers with an empty return.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
