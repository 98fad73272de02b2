// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use super::session::BatchSession;
use async_trait::async_trait;
use fleet_core::domain::agent::AgentId;
use fleet_core::domain::batch_options::{BatchOptions, BatchSpec, BatchTuning};
use fleet_core::domain::job::{JobAck, JobId, JobIdGenerator, JobRequest, Target};
use fleet_core::domain::transport::{JobClient, TransportError};
use fleet_core::infrastructure::event_bus::InMemoryEventBus;
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Transport double that records every submission and acks immediately.
///
/// Expression targets match the configured agents; list targets match their
/// members. No returns are published.
#[derive(Clone, Default)]
pub(crate) struct RecordingClient {
    matched: Vec<AgentId>,
    requests: Arc<Mutex<Vec<JobRequest>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingClient {
    pub(crate) fn matching(ids: &[&str]) -> Self {
        Self {
            matched: ids.iter().map(|id| AgentId::from(*id)).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn requests(&self) -> Vec<JobRequest> {
        self.requests.lock().clone()
    }

    pub(crate) fn fail_on(&self, fun: &str) {
        self.failing.lock().insert(fun.to_string());
    }
}

#[async_trait]
impl JobClient for RecordingClient {
    async fn run_job(&self, request: JobRequest) -> Result<JobAck, TransportError> {
        self.requests.lock().push(request.clone());
        if self.failing.lock().contains(&request.fun) {
            return Err(TransportError::Unavailable("connection refused".to_string()));
        }
        let minions = match &request.target {
            Target::Expression { .. } => self.matched.clone(),
            Target::List { agents } => agents.iter().cloned().collect(),
        };
        Ok(JobAck {
            jid: request.jid,
            minions,
        })
    }
}

/// Deterministic job ids: `n`, `n+1`, ...
pub(crate) struct SequenceJids(AtomicU64);

impl SequenceJids {
    pub(crate) fn starting_at(first: u64) -> Self {
        Self(AtomicU64::new(first))
    }
}

impl JobIdGenerator for SequenceJids {
    fn next_jid(&self) -> JobId {
        JobId::new(self.0.fetch_add(1, Ordering::SeqCst).to_string())
    }
}

pub(crate) fn options(batch: BatchSpec) -> BatchOptions {
    BatchOptions::new("*", "my.fun").with_tuning(BatchTuning {
        batch,
        timeout: Duration::from_secs(5),
        gather_job_timeout: Duration::from_secs(5),
        presence_ping_timeout: None,
        batch_delay: Duration::from_secs(1),
    })
}

/// Session with ids 1234 (ping), 1235 (batch), 1236 (first liveness round).
pub(crate) fn session_with(client: RecordingClient, batch: BatchSpec) -> (BatchSession, Arc<InMemoryEventBus>) {
    let bus = Arc::new(InMemoryEventBus::new(256));
    let session = BatchSession::new(
        options(batch),
        Arc::new(client),
        bus.clone(),
        Arc::new(SequenceJids::starting_at(1234)),
    )
    .expect("valid batch size");
    (session, bus)
}

pub(crate) fn agents(ids: &[&str]) -> BTreeSet<AgentId> {
    ids.iter().map(|id| AgentId::from(*id)).collect()
}
