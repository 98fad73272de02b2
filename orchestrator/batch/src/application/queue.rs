// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Single-consumer work queue driving a batch session.
//!
//! Components never call each other across wave boundaries; they push a
//! [`Task`] and the session loop picks it up on a later turn. Timers are
//! spawned sleeps that push their task when they fire, unless the queue's
//! timer token has been cancelled first.

use fleet_core::domain::agent::AgentId;
use fleet_core::domain::job::JobId;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Resolve the batch size and emit the start event (first call only)
    StartBatch,
    /// Coalescing request to advance to the next wave
    ScheduleNext,
    /// Dispatch the next wave or finish the batch
    AdvanceWave,
    /// Issue a liveness poll for a wave's unsettled agents
    CheckLiveness(BTreeSet<AgentId>),
    /// Settle the liveness round issued under `jid`
    EvaluateLiveness { agents: BTreeSet<AgentId>, jid: JobId },
}

pub struct TaskQueue {
    sender: mpsc::UnboundedSender<Task>,
    timers: CancellationToken,
}

impl TaskQueue {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Task>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            sender,
            timers: CancellationToken::new(),
        };
        (queue, receiver)
    }

    /// Run `task` on the next loop turn.
    pub fn spawn_callback(&self, task: Task) {
        trace!(?task, "Queueing task");
        // The receiver lives as long as the session that owns this queue
        let _ = self.sender.send(task);
    }

    /// Run `task` once `delay` has elapsed, unless the timers are cancelled first.
    pub fn call_later(&self, delay: Duration, task: Task) {
        if delay.is_zero() {
            self.spawn_callback(task);
            return;
        }
        trace!(?task, ?delay, "Arming timer");
        let sender = self.sender.clone();
        let token = self.timers.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = sender.send(task);
                }
            }
        });
    }

    /// Token cancelling every pending timer.
    pub fn timer_token(&self) -> CancellationToken {
        self.timers.clone()
    }
}
