// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Job Primitives
//!
//! Value objects describing a job submitted to the fleet:
//!
//! - [`JobId`]: opaque job identifier, minted by a [`JobIdGenerator`].
//! - [`Target`]: what the transport should match the job against.
//! - [`JobRequest`] / [`JobAck`]: submission and its eager acknowledgment.

use crate::domain::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

/// Function every agent answers to during presence discovery.
pub const PING_FUNCTION: &str = "test.ping";

/// Function asking an agent whether it is still executing a job.
pub const FIND_JOB_FUNCTION: &str = "saltutil.find_job";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source of fresh job identifiers.
pub trait JobIdGenerator: Send + Sync {
    fn next_jid(&self) -> JobId;
}

/// Target of a job submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Target {
    /// Opaque target expression, interpreted by the transport (`glob`, `grain`, ...).
    Expression { tgt: String, tgt_type: String },
    /// Explicit agent list.
    List { agents: BTreeSet<AgentId> },
}

impl Target {
    pub fn expression(tgt: impl Into<String>, tgt_type: impl Into<String>) -> Self {
        Self::Expression {
            tgt: tgt.into(),
            tgt_type: tgt_type.into(),
        }
    }

    pub fn list(agents: impl IntoIterator<Item = AgentId>) -> Self {
        Self::List {
            agents: agents.into_iter().collect(),
        }
    }

    /// Target-expression kind as understood by the transport.
    pub fn tgt_type(&self) -> &str {
        match self {
            Self::Expression { tgt_type, .. } => tgt_type,
            Self::List { .. } => "list",
        }
    }
}

/// A job submission handed to the [`JobClient`](crate::domain::transport::JobClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub target: Target,
    pub fun: String,
    #[serde(default)]
    pub arg: Vec<serde_json::Value>,
    pub jid: JobId,
    #[serde(with = "humantime_serde")]
    pub gather_job_timeout: Duration,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Eager acknowledgment of a submission: the agents the transport matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAck {
    pub jid: JobId,
    pub minions: Vec<AgentId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_kind() {
        assert_eq!(Target::expression("web*", "glob").tgt_type(), "glob");
        assert_eq!(Target::list([AgentId::from("a")]).tgt_type(), "list");
    }

    #[test]
    fn test_list_target_deduplicates() {
        let target = Target::list(vec![AgentId::from("b"), AgentId::from("a"), AgentId::from("b")]);
        match target {
            Target::List { agents } => {
                assert_eq!(agents.len(), 2);
                assert_eq!(agents.iter().next().map(AgentId::as_str), Some("a"));
            }
            _ => panic!("expected list target"),
        }
    }
}
