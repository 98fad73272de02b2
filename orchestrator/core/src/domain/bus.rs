// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Event Bus Contract
//!
//! Tag-based publish/subscribe used by agents to report job returns and by the
//! orchestrator to announce batch lifecycle events.
//!
//! ## Tag Scheme
//!
//! | Tag | Publisher | Payload |
//! |-----|-----------|---------|
//! | `job/<jid>/return/<agent>` | agent | `{ "id": <agent>, "return": <any> }` |
//! | `batch/<jid>/start` | orchestrator | available / down agents, metadata |
//! | `batch/<jid>/done` | orchestrator | available / done / down / timed-out agents, metadata |
//!
//! Subscription patterns are prefix globs with a trailing `*`
//! (`job/<jid>/return/*`).

use crate::domain::agent::AgentId;
use crate::domain::job::JobId;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::warn;

/// An event as delivered by the bus: concrete tag plus JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    pub tag: String,
    pub data: serde_json::Value,
}

/// Payload published by an agent on `job/<jid>/return/<agent>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReturn {
    pub id: AgentId,
    #[serde(rename = "return", default)]
    pub ret: serde_json::Value,
}

pub trait EventBus: Send + Sync {
    /// Register interest in tags matching `pattern`.
    fn subscribe(&self, pattern: &str);

    /// Drop a previously registered pattern. Returns `false` if it was not registered.
    fn unsubscribe(&self, pattern: &str) -> bool;

    /// Publish `data` under `tag` to every listener.
    fn fire_event(&self, tag: &str, data: serde_json::Value);

    /// Open a new listener. Dropping the receiver detaches it from the bus.
    fn listen(&self) -> EventReceiver;
}

/// Listener handle returned by [`EventBus::listen`].
pub struct EventReceiver {
    receiver: broadcast::Receiver<BusEvent>,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<BusEvent>) -> Self {
        Self { receiver }
    }

    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<BusEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<BusEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

pub fn job_return_pattern(jid: &JobId) -> String {
    format!("job/{}/return/*", jid)
}

pub fn job_return_tag(jid: &JobId, agent: &AgentId) -> String {
    format!("job/{}/return/{}", jid, agent)
}

pub fn batch_start_tag(jid: &JobId) -> String {
    format!("batch/{}/start", jid)
}

pub fn batch_done_tag(jid: &JobId) -> String {
    format!("batch/{}/done", jid)
}

/// Split a concrete `job/<jid>/return/<agent>` tag into its job id and agent.
pub fn parse_job_return_tag(tag: &str) -> Option<(JobId, AgentId)> {
    let rest = tag.strip_prefix("job/")?;
    let (jid, agent) = rest.split_once("/return/")?;
    if jid.is_empty() || agent.is_empty() || agent.contains('/') {
        return None;
    }
    Some((JobId::new(jid), AgentId::new(agent)))
}

/// Whether a concrete tag matches a subscription pattern.
///
/// A trailing `*` matches any suffix; otherwise the match is exact.
pub fn tag_matches(pattern: &str, tag: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => tag.starts_with(prefix),
        None => pattern == tag,
    }
}
