// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Liveness Checker
//!
//! Polls dispatched agents that have not returned yet and asks whether they
//! are still running the batch job. A round is:
//!
//! 1. `check_liveness`: subscribe to the round's job id and send the poll
//! 2. `gather_job_timeout` later, `evaluate_liveness`: agents that answered
//!    keep their slot and are polled again; the rest time out and free theirs.
//!
//! Rounds repeat for as long as an agent keeps confirming.

use super::queue::Task;
use super::session::BatchSession;
use crate::domain::events::HandlerKind;
use fleet_core::domain::agent::AgentId;
use fleet_core::domain::job::{JobId, Target, FIND_JOB_FUNCTION};
use serde_json::json;
use std::collections::BTreeSet;
use tracing::{debug, warn};

impl BatchSession {
    /// Open a liveness round over the unsettled members of `agents`.
    pub(crate) async fn check_liveness(&mut self, agents: BTreeSet<AgentId>) {
        if self.is_closed() {
            return;
        }
        let pending = self.state.unsettled(&agents);
        if pending.is_empty() {
            return;
        }

        let jid = self.next_liveness_jid();
        if let Some(resources) = self.resources.as_mut() {
            resources.subscribe(&jid, HandlerKind::LivenessReturn);
        }

        let batch_jid = self.batch_jid.clone();
        let Some((client, request)) = self.job_request(
            Target::list(pending.iter().cloned()),
            FIND_JOB_FUNCTION,
            vec![json!(batch_jid.as_str())],
            &jid,
        ) else {
            return;
        };
        debug!(%batch_jid, %jid, polled = pending.len(), "Polling agents for the batch job");

        // An unanswered poll is indistinguishable from dead agents; let the round evaluate
        if let Err(e) = client.run_job(request).await {
            warn!(%batch_jid, %jid, error = %e, "Liveness poll failed");
        }

        self.queue.call_later(
            self.options.tuning.gather_job_timeout,
            Task::EvaluateLiveness { agents: pending, jid },
        );
    }

    /// Close a liveness round: time out the silent, re-poll the confirmed.
    pub(crate) fn evaluate_liveness(&mut self, agents: &BTreeSet<AgentId>, jid: &JobId) {
        let Some(resources) = self.resources.as_mut() else {
            return;
        };
        resources.unsubscribe(jid);

        let outcome = self.state.settle_liveness_round(agents);

        if !outcome.timed_out.is_empty() {
            warn!(
                batch_jid = %self.batch_jid,
                timed_out = ?outcome.timed_out.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
                "Agents stopped answering; marking as timed out"
            );
            metrics::counter!("fleet_batch_agents_timed_out_total").increment(outcome.timed_out.len() as u64);
            self.schedule_next();
        }

        if !outcome.still_running.is_empty() {
            debug!(
                batch_jid = %self.batch_jid,
                still_running = outcome.still_running.len(),
                "Agents still running the batch job"
            );
            self.queue.spawn_callback(Task::CheckLiveness(outcome.still_running));
        }
    }

    /// The first round reuses the id minted with the session; later rounds get fresh ones.
    fn next_liveness_jid(&mut self) -> JobId {
        if self.liveness_seed_used {
            self.jid_gen.next_jid()
        } else {
            self.liveness_seed_used = true;
            self.liveness_jid.clone()
        }
    }
}
