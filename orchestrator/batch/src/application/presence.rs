// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presence Prober
//!
//! Discovers which targeted agents are alive before the first wave. The probe
//! is a broadcast ping against the full target expression; its acknowledgment
//! fixes `targeted_agents`, and ping returns grow `live_agents` (see the
//! router). Batching starts when every targeted agent answered or when the
//! discovery deadline fires, whichever comes first.

use super::queue::Task;
use super::session::BatchSession;
use crate::domain::error::BatchError;
use crate::domain::events::HandlerKind;
use fleet_core::domain::job::{Target, PING_FUNCTION};
use tracing::{info, warn};

impl BatchSession {
    /// Subscribe to presence and batch returns, probe the target, and arm the
    /// discovery deadline.
    pub(crate) async fn start(&mut self) -> Result<(), BatchError> {
        let ping_jid = self.ping_jid.clone();
        let batch_jid = self.batch_jid.clone();
        let Some(resources) = self.resources.as_mut() else {
            return Ok(());
        };
        // Subscribed before the probe goes out so the first return cannot be missed
        resources.subscribe(&ping_jid, HandlerKind::PresenceReturn);
        resources.subscribe(&batch_jid, HandlerKind::BatchReturn);

        let target = Target::expression(self.options.tgt.clone(), self.options.tgt_type.clone());
        let Some((client, request)) = self.job_request(target, PING_FUNCTION, Vec::new(), &ping_jid) else {
            return Ok(());
        };
        let ack = client.run_job(request).await.map_err(|source| {
            warn!(%ping_jid, error = %source, "Presence probe failed");
            BatchError::Dispatch {
                stage: "presence",
                jid: ping_jid.clone(),
                source,
            }
        })?;

        self.state.targeted_agents = ack.minions.into_iter().collect();
        let discovery_timeout = self.options.tuning.discovery_timeout();
        info!(
            batch_jid = %self.batch_jid,
            targeted = self.state.targeted_agents.len(),
            ?discovery_timeout,
            "Presence probe dispatched"
        );

        if self.state.targeted_agents.is_empty() {
            self.queue.spawn_callback(Task::StartBatch);
        } else {
            self.queue.call_later(discovery_timeout, Task::StartBatch);
        }
        Ok(())
    }
}
