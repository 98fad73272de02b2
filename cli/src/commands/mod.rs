// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the fleet CLI

pub mod batch;
pub mod config;

pub use self::batch::BatchCommand;
pub use self::config::ConfigCommand;
