// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `fleet-core`: Fleet Orchestrator Primitives
//!
//! Shared vocabulary for dispatching jobs to a fleet of remote agents.
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | agent/job identifiers, bus and transport contracts, configuration |
//! | [`infrastructure`] | Infrastructure | in-memory event bus, job-id generator, simulated fleet |

pub mod domain;
pub mod infrastructure;

pub use domain::*;
