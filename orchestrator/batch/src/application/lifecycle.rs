// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Lifecycle Manager
//!
//! [`SessionResources`] owns everything a session holds on external
//! collaborators: the transport client, the bus listener, the registered
//! return patterns and the pending timers. Dropping it releases all of them
//! exactly once, so teardown is the same on normal completion, on
//! cancellation and when a session is dropped mid-run.

use super::session::BatchSession;
use crate::domain::events::HandlerKind;
use fleet_core::domain::bus::{job_return_pattern, tag_matches, EventBus, EventReceiver};
use fleet_core::domain::job::JobId;
use fleet_core::domain::transport::JobClient;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::DropGuard;
use tracing::debug;

pub(crate) struct SessionResources {
    pub(crate) client: Arc<dyn JobClient>,
    pub(crate) bus: Arc<dyn EventBus>,
    pub(crate) receiver: EventReceiver,
    subscriptions: BTreeMap<String, HandlerKind>,
    _timers: DropGuard,
}

impl SessionResources {
    pub(crate) fn new(
        client: Arc<dyn JobClient>,
        bus: Arc<dyn EventBus>,
        timers: DropGuard,
    ) -> Self {
        let receiver = bus.listen();
        Self {
            client,
            bus,
            receiver,
            subscriptions: BTreeMap::new(),
            _timers: timers,
        }
    }

    /// Register the return pattern of `jid` with the bus and the routing table.
    pub(crate) fn subscribe(&mut self, jid: &JobId, kind: HandlerKind) {
        let pattern = job_return_pattern(jid);
        if self.subscriptions.contains_key(&pattern) {
            return;
        }
        self.bus.subscribe(&pattern);
        self.subscriptions.insert(pattern, kind);
    }

    pub(crate) fn unsubscribe(&mut self, jid: &JobId) {
        let pattern = job_return_pattern(jid);
        if self.subscriptions.remove(&pattern).is_some() {
            self.bus.unsubscribe(&pattern);
        }
    }

    /// Handler registered for a concrete tag, if any.
    pub(crate) fn handler_for(&self, tag: &str) -> Option<HandlerKind> {
        self.subscriptions
            .iter()
            .find(|(pattern, _)| tag_matches(pattern, tag))
            .map(|(_, kind)| *kind)
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        for pattern in self.subscriptions.keys() {
            // Already-released patterns are reported as `false`, never raised
            self.bus.unsubscribe(pattern);
        }
        debug!(patterns = self.subscriptions.len(), "Released batch session resources");
        self.subscriptions.clear();
    }
}

impl BatchSession {
    /// Release the transport client, the bus listener, every registered
    /// pattern and all pending timers. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(resources) = self.resources.take() {
            debug!(batch_jid = %self.batch_jid, "Closing batch session");
            drop(resources);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.resources.is_none()
    }
}
