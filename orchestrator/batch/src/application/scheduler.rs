// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Wave Scheduler
//!
//! Turns the live fleet into waves of at most `batch_size` agents.
//!
//! ## Wave Advance
//! | Trigger | Path |
//! |---------|------|
//! | discovery settled | `start_batch` → `AdvanceWave` |
//! | agent returned / timed out | `schedule_next` → (after `batch_delay`) `AdvanceWave` |
//! | nothing left to dispatch | `advance_wave` → `end_batch` |
//!
//! `schedule_next` coalesces: however many completions arrive inside one
//! `batch_delay` window, exactly one advance is queued.

use super::queue::Task;
use super::session::BatchSession;
use crate::domain::error::BatchError;
use crate::domain::events::{BatchDone, BatchStarted};
use fleet_core::domain::bus::{batch_done_tag, batch_start_tag};
use fleet_core::domain::job::Target;
use tracing::{debug, error, info};

impl BatchSession {
    /// Resolve the batch size and announce the batch. Later calls are no-ops.
    pub(crate) fn start_batch(&mut self) {
        if self.state.initialized || self.is_closed() {
            return;
        }
        self.state.batch_size = self.batch_spec.resolve(self.state.live_agents.len());
        self.state.initialized = true;

        let started = BatchStarted {
            available_agents: self.state.live_agents.clone(),
            down_agents: self.state.down_agents(),
            metadata: self.options.metadata.clone(),
        };
        info!(
            batch_jid = %self.batch_jid,
            batch_size = self.state.batch_size,
            available = started.available_agents.len(),
            down = started.down_agents.len(),
            "Batch started"
        );
        self.fire_lifecycle_event(&batch_start_tag(&self.batch_jid), &started);

        self.queue.spawn_callback(Task::AdvanceWave);
    }

    /// Request a wave advance, unless one is already pending.
    pub(crate) fn schedule_next(&mut self) {
        if self.state.wave_scheduled {
            return;
        }
        self.state.wave_scheduled = true;
        // Wait a little so returns landing together share one advance
        self.queue.call_later(self.options.tuning.batch_delay, Task::AdvanceWave);
    }

    /// Dispatch the job to the next wave, or finish the batch if there is none.
    pub(crate) async fn advance_wave(&mut self) -> Result<(), BatchError> {
        self.state.wave_scheduled = false;
        if self.is_closed() {
            return Ok(());
        }

        let wave = self.state.compute_next_wave();
        if wave.is_empty() {
            self.end_batch();
            return Ok(());
        }

        self.state.activate(&wave);
        let batch_jid = self.batch_jid.clone();
        let Some((client, request)) = self.job_request(
            Target::list(wave.iter().cloned()),
            &self.options.fun,
            self.options.arg.clone(),
            &batch_jid,
        ) else {
            return Ok(());
        };

        if let Err(source) = client.run_job(request).await {
            error!(%batch_jid, error = %source, "Error in scheduling next wave; aborting batch");
            self.state.deactivate(&wave);
            return Err(BatchError::Dispatch {
                stage: "wave",
                jid: batch_jid,
                source,
            });
        }

        metrics::counter!("fleet_batch_waves_dispatched_total").increment(1);
        metrics::counter!("fleet_batch_agents_dispatched_total").increment(wave.len() as u64);
        info!(
            %batch_jid,
            wave = ?wave.iter().map(|a| a.as_str()).collect::<Vec<_>>(),
            active = self.state.active.len(),
            done = self.state.done_agents.len(),
            "Dispatched wave"
        );

        // The wave may well finish before the first poll; check_liveness skips settled agents
        self.queue.call_later(self.options.tuning.timeout, Task::CheckLiveness(wave));
        Ok(())
    }

    /// Emit the done event and tear down, once nothing is left running.
    pub(crate) fn end_batch(&mut self) {
        if self.state.ended || self.is_closed() {
            return;
        }
        if !self.state.is_settled() {
            debug!(
                batch_jid = %self.batch_jid,
                active = self.state.active.len(),
                "No wave to dispatch; waiting for active agents"
            );
            return;
        }
        self.state.ended = true;

        let done = BatchDone {
            available_agents: self.state.live_agents.clone(),
            done_agents: self.state.done_agents.clone(),
            down_agents: self.state.down_agents(),
            timedout_agents: self.state.timedout_agents.clone(),
            metadata: self.options.metadata.clone(),
        };
        info!(
            batch_jid = %self.batch_jid,
            done = done.done_agents.len(),
            down = done.down_agents.len(),
            timedout = done.timedout_agents.len(),
            "Batch done"
        );
        metrics::counter!("fleet_batches_completed_total").increment(1);
        self.fire_lifecycle_event(&batch_done_tag(&self.batch_jid), &done);

        self.close();
    }

    fn fire_lifecycle_event<T: serde::Serialize>(&self, tag: &str, payload: &T) {
        match serde_json::to_value(payload) {
            Ok(data) => self.fire_event(tag, data),
            Err(e) => error!(tag, error = %e, "Failed to serialize lifecycle event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::application::queue::Task;
    use crate::application::test_support::{agents, session_with, RecordingClient};
    use crate::domain::error::BatchError;
    use crate::domain::events::{BatchDone, BatchStarted};
    use fleet_core::domain::batch_options::BatchSpec;
    use fleet_core::domain::bus::EventBus;
    use fleet_core::domain::job::Target;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    #[tokio::test]
    async fn test_batch_size_from_count() {
        let (mut session, _bus) = session_with(RecordingClient::matching(&[]), BatchSpec::Text("2".to_string()));
        session.state.live_agents = agents(&["foo", "bar"]);
        session.start_batch();
        assert_eq!(session.state.batch_size, 2);
    }

    #[tokio::test]
    async fn test_batch_size_from_percentage() {
        let (mut session, _bus) = session_with(RecordingClient::matching(&[]), BatchSpec::Text("30%".to_string()));
        session.state.targeted_agents = agents(&["a", "b", "c", "d", "e"]);
        session.state.live_agents = agents(&["a", "b", "c", "d", "e"]);
        session.start_batch();
        assert_eq!(session.state.batch_size, 2);
    }

    #[tokio::test]
    async fn test_batch_fire_start_event() {
        let (mut session, bus) = session_with(RecordingClient::matching(&[]), BatchSpec::Count(2));
        let mut listener = bus.listen();
        session.options.metadata = HashMap::from([("mykey".to_string(), json!("myvalue"))]);
        session.state.targeted_agents = agents(&["foo", "bar", "baz"]);
        session.state.live_agents = agents(&["foo", "bar"]);

        session.start_batch();

        let event = listener.try_recv().unwrap();
        assert_eq!(event.tag, "batch/1235/start");
        let started: BatchStarted = serde_json::from_value(event.data).unwrap();
        assert_eq!(started.available_agents, agents(&["foo", "bar"]));
        assert_eq!(started.down_agents, agents(&["baz"]));
        assert_eq!(started.metadata["mykey"], "myvalue");
    }

    #[tokio::test]
    async fn test_start_batch_queues_first_wave_once() {
        let (mut session, _bus) = session_with(RecordingClient::matching(&[]), BatchSpec::Count(1));
        session.start_batch();
        assert!(session.state.initialized);
        assert_eq!(session.next_queued(), Some(Task::AdvanceWave));

        session.start_batch();
        assert!(session.next_queued().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_advance_wave_dispatches_job_to_wave() {
        let client = RecordingClient::matching(&["foo", "bar"]);
        let (mut session, _bus) = session_with(client.clone(), BatchSpec::Count(2));
        session.options.arg = vec![json!("nginx")];
        session.state.targeted_agents = agents(&["foo", "bar"]);
        session.state.live_agents = agents(&["foo", "bar"]);
        session.state.batch_size = 2;

        session.advance_wave().await.unwrap();

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].target, Target::list(agents(&["foo", "bar"])));
        assert_eq!(requests[0].target.tgt_type(), "list");
        assert_eq!(requests[0].fun, "my.fun");
        assert_eq!(requests[0].arg, vec![json!("nginx")]);
        assert_eq!(requests[0].jid.as_str(), "1235");
        assert_eq!(session.state.active, agents(&["foo", "bar"]));

        // First liveness check waits for the job timeout
        assert!(session.next_queued().is_none());
        tokio::time::sleep(session.options.tuning.timeout + Duration::from_millis(1)).await;
        assert_eq!(session.next_queued(), Some(Task::CheckLiveness(agents(&["foo", "bar"]))));
    }

    #[tokio::test]
    async fn test_advance_wave_ends_batch_when_nothing_left() {
        let (mut session, bus) = session_with(RecordingClient::matching(&[]), BatchSpec::Count(1));
        let mut listener = bus.listen();
        session.state.targeted_agents = agents(&["foo"]);
        session.state.live_agents = agents(&["foo"]);
        session.state.done_agents = agents(&["foo"]);

        session.advance_wave().await.unwrap();

        assert!(session.state.ended);
        assert!(session.is_closed());
        assert_eq!(listener.try_recv().unwrap().tag, "batch/1235/done");
    }

    #[tokio::test]
    async fn test_end_batch_waits_for_active_agents() {
        let (mut session, bus) = session_with(RecordingClient::matching(&[]), BatchSpec::Count(1));
        let mut listener = bus.listen();
        session.state.targeted_agents = agents(&["foo", "bar"]);
        session.state.live_agents = agents(&["foo", "bar"]);
        session.state.done_agents = agents(&["foo"]);
        session.state.active = agents(&["bar"]);

        session.advance_wave().await.unwrap();

        assert!(!session.state.ended);
        assert!(!session.is_closed());
        assert!(listener.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_batch_fire_done_event() {
        let (mut session, bus) = session_with(RecordingClient::matching(&[]), BatchSpec::Count(1));
        let mut listener = bus.listen();
        session.options.metadata = HashMap::from([("mykey".to_string(), json!("myvalue"))]);
        session.state.targeted_agents = agents(&["foo", "baz", "bar"]);
        session.state.live_agents = agents(&["foo", "bar"]);
        session.state.done_agents = agents(&["foo"]);
        session.state.timedout_agents = agents(&["bar"]);

        session.end_batch();

        let event = listener.try_recv().unwrap();
        assert_eq!(event.tag, "batch/1235/done");
        let done: BatchDone = serde_json::from_value(event.data).unwrap();
        assert_eq!(done.available_agents, agents(&["foo", "bar"]));
        assert_eq!(done.done_agents, agents(&["foo"]));
        assert_eq!(done.down_agents, agents(&["baz"]));
        assert_eq!(done.timedout_agents, agents(&["bar"]));
        assert_eq!(done.metadata["mykey"], "myvalue");

        // Fires once
        session.end_batch();
        assert!(listener.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_next_coalesces() {
        let (mut session, _bus) = session_with(RecordingClient::matching(&[]), BatchSpec::Count(1));

        for _ in 0..5 {
            session.schedule_next();
        }
        tokio::time::sleep(session.options.tuning.batch_delay + Duration::from_millis(1)).await;

        assert_eq!(session.drain_queued(), vec![Task::AdvanceWave]);
    }

    #[tokio::test]
    async fn test_only_one_advance_is_scheduled() {
        let (mut session, _bus) = session_with(RecordingClient::matching(&[]), BatchSpec::Count(1));
        session.options.tuning.batch_delay = Duration::ZERO;
        session.state.wave_scheduled = true;

        session.schedule_next();
        assert!(session.next_queued().is_none());
    }

    #[tokio::test]
    async fn test_advance_clears_scheduled_flag() {
        let (mut session, _bus) = session_with(RecordingClient::matching(&[]), BatchSpec::Count(1));
        session.options.tuning.batch_delay = Duration::ZERO;
        session.state.targeted_agents = agents(&["foo", "bar"]);
        session.state.live_agents = agents(&["foo", "bar"]);
        session.state.active = agents(&["foo"]);

        session.schedule_next();
        assert_eq!(session.next_queued(), Some(Task::AdvanceWave));
        session.advance_wave().await.unwrap();
        assert!(!session.state.wave_scheduled);

        session.schedule_next();
        assert_eq!(session.next_queued(), Some(Task::AdvanceWave));
    }

    #[tokio::test]
    async fn test_dispatch_failure_aborts_wave() {
        let client = RecordingClient::matching(&[]);
        client.fail_on("my.fun");
        let (mut session, _bus) = session_with(client, BatchSpec::Count(2));
        session.state.targeted_agents = agents(&["foo", "bar"]);
        session.state.live_agents = agents(&["foo", "bar"]);
        session.state.batch_size = 2;

        let err = session.advance_wave().await.unwrap_err();

        assert!(matches!(err, BatchError::Dispatch { stage: "wave", .. }));
        assert!(session.state.active.is_empty());
    }
}
