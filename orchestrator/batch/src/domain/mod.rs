// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Batch Domain Layer
//!
//! Pure batch bookkeeping. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`state`] | `BatchState`, `LivenessOutcome` |
//! | [`events`] | `HandlerKind`, `BatchEvent`, `BatchStarted`, `BatchDone` |
//! | [`report`] | `BatchReport`, `BatchStatus` |
//! | [`error`] | `BatchError` |

pub mod state;
pub mod events;
pub mod report;
pub mod error;

pub use state::*;
pub use events::*;
pub use report::*;
pub use error::*;
