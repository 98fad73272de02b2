// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use fleet_core::domain::batch_options::BatchSizeError;
use fleet_core::domain::job::JobId;
use fleet_core::domain::transport::TransportError;
use thiserror::Error;

/// Errors surfaced to the caller of a batch session.
///
/// Slow or absent agents are not errors; they end up in the report as down or
/// timed-out agents.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    InvalidBatchSize(#[from] BatchSizeError),

    #[error("Failed to dispatch {stage} job {jid}: {source}")]
    Dispatch {
        stage: &'static str,
        jid: JobId,
        #[source]
        source: TransportError,
    },

    #[error("Event bus closed while batch {0} was running")]
    BusClosed(JobId),
}
