// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `fleet-batch`: Wave-Based Fleet Dispatch
//!
//! Runs one job across a large, dynamically discovered fleet in bounded-size
//! waves. A [`BatchSession`] discovers which targeted agents are alive,
//! dispatches the job to at most `batch_size` agents at a time, polls running
//! agents for liveness, and advances to the next wave as agents settle.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `BatchState`, `BatchEvent`, lifecycle payloads, `BatchReport`, `BatchError` |
//! | [`application`] | Application | `BatchSession` and its prober, scheduler, liveness checker, router |
//!
//! ## Control Flow
//!
//! ```text
//! start ──ping──▶ discovery ──timer / all answered──▶ start_batch
//!                                                        │
//!        ┌──────────── schedule_next ◀── job return ─────┤
//!        ▼                                               ▼
//!   advance_wave ──dispatch──▶ active ──timeout──▶ check_liveness ⇄ evaluate_liveness
//!        │                                                    │
//!        └── nothing left ──▶ end_batch ──▶ close        timed out
//! ```
//!
//! Every step runs as a task on the session's own queue; timers push tasks
//! onto that queue and are cancelled when the session closes.

pub mod domain;
pub mod application;

pub use application::BatchSession;
pub use domain::*;
