// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Batch Session
//!
//! One [`BatchSession`] per batch job. The session exclusively owns its
//! [`BatchState`] and is driven by [`BatchSession::run`], a single loop that
//! takes one step at a time from three sources:
//!
//! | Source | Step |
//! |--------|------|
//! | task queue | `StartBatch`, `ScheduleNext`, `AdvanceWave`, `CheckLiveness`, `EvaluateLiveness` |
//! | event bus | job returns, routed by [`super::router`] |
//! | cancellation token | close without emitting the done event |
//!
//! No two steps ever run concurrently, so the state needs no locking. The
//! component operations live in sibling modules as further `impl BatchSession`
//! blocks.

use super::lifecycle::SessionResources;
use super::queue::{Task, TaskQueue};
use crate::domain::error::BatchError;
use crate::domain::report::{BatchReport, BatchStatus};
use crate::domain::state::BatchState;
use fleet_core::domain::batch_options::{BatchOptions, BatchSize};
use fleet_core::domain::bus::{BusEvent, EventBus, EventBusError};
use fleet_core::domain::job::{JobId, JobIdGenerator, JobRequest, Target};
use fleet_core::domain::transport::JobClient;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

enum Step {
    Task(Task),
    Event(Result<BusEvent, EventBusError>),
    Cancelled,
}

pub struct BatchSession {
    pub(crate) options: BatchOptions,
    pub(crate) batch_spec: BatchSize,
    pub(crate) state: BatchState,
    pub(crate) ping_jid: JobId,
    pub(crate) batch_jid: JobId,
    pub(crate) liveness_jid: JobId,
    pub(crate) liveness_seed_used: bool,
    pub(crate) jid_gen: Arc<dyn JobIdGenerator>,
    pub(crate) queue: TaskQueue,
    pub(crate) tasks: mpsc::UnboundedReceiver<Task>,
    pub(crate) resources: Option<SessionResources>,
    cancel: CancellationToken,
}

impl BatchSession {
    /// Create a session. Fails only on a malformed batch size.
    ///
    /// Mints the presence, batch and first liveness job ids, in that order, and
    /// opens the bus listener so no return can be missed once `run` starts.
    pub fn new(
        options: BatchOptions,
        client: Arc<dyn JobClient>,
        bus: Arc<dyn EventBus>,
        jid_gen: Arc<dyn JobIdGenerator>,
    ) -> Result<Self, BatchError> {
        let batch_spec = options.tuning.batch.parse()?;
        let ping_jid = jid_gen.next_jid();
        let batch_jid = jid_gen.next_jid();
        let liveness_jid = jid_gen.next_jid();

        let (queue, tasks) = TaskQueue::new();
        let resources = SessionResources::new(client, bus, queue.timer_token().drop_guard());

        debug!(
            %ping_jid,
            %batch_jid,
            %liveness_jid,
            fun = %options.fun,
            batch = %options.tuning.batch,
            "Created batch session"
        );

        Ok(Self {
            options,
            batch_spec,
            state: BatchState::new(),
            ping_jid,
            batch_jid,
            liveness_jid,
            liveness_seed_used: false,
            jid_gen,
            queue,
            tasks,
            resources: Some(resources),
            cancel: CancellationToken::new(),
        })
    }

    pub fn ping_jid(&self) -> &JobId {
        &self.ping_jid
    }

    pub fn batch_jid(&self) -> &JobId {
        &self.batch_jid
    }

    pub fn liveness_jid(&self) -> &JobId {
        &self.liveness_jid
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// Token that cancels [`run`](Self::run) when triggered.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Drive the batch to completion or cancellation.
    ///
    /// Dispatch failures of the presence probe or of a wave close the session
    /// and are returned; every other anomaly ends up in the report.
    ///
    /// The bus must buffer every return of a wave between two steps. A
    /// listener that lags only logs a warning and skips the dropped events: a
    /// lost presence return reports a live agent as down, and a lost batch
    /// return leaves a finished agent to time out at its next liveness round.
    pub async fn run(mut self) -> Result<BatchReport, BatchError> {
        info!(batch_jid = %self.batch_jid, tgt = %self.options.tgt, fun = %self.options.fun, "Starting batch");

        if let Err(e) = self.start().await {
            self.close();
            return Err(e);
        }

        loop {
            let step = {
                let Some(resources) = self.resources.as_mut() else {
                    break;
                };
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Step::Cancelled,
                    Some(task) = self.tasks.recv() => Step::Task(task),
                    event = resources.receiver.recv() => Step::Event(event),
                }
            };

            match step {
                Step::Task(task) => {
                    if let Err(e) = self.run_task(task).await {
                        self.close();
                        return Err(e);
                    }
                }
                Step::Event(Ok(event)) => self.handle_event(event),
                Step::Event(Err(EventBusError::Lagged(n))) => {
                    warn!(batch_jid = %self.batch_jid, missed = n, "Batch session missed bus events");
                }
                Step::Event(Err(_)) => {
                    self.close();
                    return Err(BatchError::BusClosed(self.batch_jid.clone()));
                }
                Step::Cancelled => {
                    info!(batch_jid = %self.batch_jid, active = self.state.active.len(), "Batch cancelled");
                    self.close();
                }
            }

            debug_assert!(
                self.state.check_invariants().is_ok(),
                "batch state invariant violated: {:?}",
                self.state.check_invariants()
            );
        }

        let status = if self.state.ended {
            BatchStatus::Completed
        } else {
            BatchStatus::Cancelled
        };
        Ok(BatchReport::from_state(
            self.batch_jid.clone(),
            status,
            &self.state,
            self.options.metadata.clone(),
        ))
    }

    pub(crate) async fn run_task(&mut self, task: Task) -> Result<(), BatchError> {
        match task {
            Task::StartBatch => self.start_batch(),
            Task::ScheduleNext => self.schedule_next(),
            Task::AdvanceWave => self.advance_wave().await?,
            Task::CheckLiveness(agents) => self.check_liveness(agents).await,
            Task::EvaluateLiveness { agents, jid } => self.evaluate_liveness(&agents, &jid),
        }
        Ok(())
    }

    /// Build a submission for the transport client. Returns `None` once closed.
    pub(crate) fn job_request(
        &self,
        target: Target,
        fun: &str,
        arg: Vec<serde_json::Value>,
        jid: &JobId,
    ) -> Option<(Arc<dyn JobClient>, JobRequest)> {
        let client = self.resources.as_ref()?.client.clone();
        let request = JobRequest {
            target,
            fun: fun.to_string(),
            arg,
            jid: jid.clone(),
            gather_job_timeout: self.options.tuning.gather_job_timeout,
            metadata: self.options.metadata.clone(),
        };
        Some((client, request))
    }

    /// Publish a lifecycle event, if the session still holds the bus.
    pub(crate) fn fire_event(&self, tag: &str, data: serde_json::Value) {
        if let Some(resources) = self.resources.as_ref() {
            resources.bus.fire_event(tag, data);
        }
    }

    #[cfg(test)]
    pub(crate) fn next_queued(&mut self) -> Option<Task> {
        self.tasks.try_recv().ok()
    }

    #[cfg(test)]
    pub(crate) fn drain_queued(&mut self) -> Vec<Task> {
        let mut drained = Vec::new();
        while let Ok(task) = self.tasks.try_recv() {
            drained.push(task);
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{agents, options, RecordingClient, SequenceJids};
    use fleet_core::domain::batch_options::BatchSpec;
    use fleet_core::infrastructure::event_bus::InMemoryEventBus;
    use serde_json::json;

    #[test]
    fn test_job_ids_are_minted_in_order() {
        let bus = Arc::new(InMemoryEventBus::new(16));
        let session = BatchSession::new(
            options(BatchSpec::Count(1)),
            Arc::new(RecordingClient::matching(&[])),
            bus,
            Arc::new(SequenceJids::starting_at(1234)),
        )
        .unwrap();

        assert_eq!(session.ping_jid().as_str(), "1234");
        assert_eq!(session.batch_jid().as_str(), "1235");
        assert_eq!(session.liveness_jid().as_str(), "1236");
    }

    #[test]
    fn test_malformed_batch_size_is_rejected() {
        let bus = Arc::new(InMemoryEventBus::new(16));
        let result = BatchSession::new(
            options(BatchSpec::Text("half".to_string())),
            Arc::new(RecordingClient::matching(&[])),
            bus.clone(),
            Arc::new(SequenceJids::starting_at(1)),
        );
        assert!(matches!(result, Err(BatchError::InvalidBatchSize(_))));
        assert_eq!(bus.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lagging_listener_keeps_running() {
        let bus = Arc::new(InMemoryEventBus::new(2));
        let client = RecordingClient::matching(&["foo"]);
        let session = BatchSession::new(
            options(BatchSpec::Count(1)),
            Arc::new(client.clone()),
            bus.clone(),
            Arc::new(SequenceJids::starting_at(1234)),
        )
        .unwrap();

        // Overflow the listener before the loop reads anything; only the
        // last two events survive, the presence return among them
        for i in 0..5 {
            bus.fire_event(&format!("job/9{}/return/foo", i), json!({"id": "foo", "return": true}));
        }
        bus.fire_event("job/1234/return/foo", json!({"id": "foo", "return": true}));

        let report = session.run().await.unwrap();

        assert_eq!(report.status, BatchStatus::Completed);
        assert!(report.down_agents.is_empty());
        // No batch return is ever published, so the agent times out
        assert_eq!(report.timedout_agents, agents(&["foo"]));
        assert!(client.requests().iter().any(|r| r.fun == "my.fun"));
        assert!(bus.patterns().is_empty());
    }
}
