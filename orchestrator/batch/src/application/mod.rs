// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Batch Application Layer
//!
//! [`BatchSession`] and the components that drive it. Each module adds one
//! `impl BatchSession` block:
//!
//! | Module | Component |
//! |--------|-----------|
//! | `session` | construction and the run loop |
//! | `presence` | presence prober |
//! | `scheduler` | wave scheduler |
//! | `liveness` | liveness checker |
//! | `router` | event router |
//! | `lifecycle` | teardown and owned external resources |
//! | `queue` | deferred tasks and timers |

mod session;
mod queue;
mod presence;
mod scheduler;
mod liveness;
mod router;
mod lifecycle;

#[cfg(test)]
pub(crate) mod test_support;

pub use session::BatchSession;
pub use queue::Task;
