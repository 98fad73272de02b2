// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::job::{JobAck, JobRequest};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to publish job {jid}: {reason}")]
    PublishFailed { jid: String, reason: String },
    #[error("Transport is unavailable: {0}")]
    Unavailable(String),
    #[error("Job submission timed out: {0}")]
    Timeout(String),
}

/// Job-submission client.
///
/// `run_job` publishes the job and resolves once the transport has matched the
/// target; results arrive later as `job/<jid>/return/<agent>` events on the bus.
#[async_trait]
pub trait JobClient: Send + Sync {
    async fn run_job(&self, request: JobRequest) -> Result<JobAck, TransportError>;
}
