// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod jid;
pub mod simulated_fleet;

pub use event_bus::InMemoryEventBus;
pub use jid::TimestampJobIdGenerator;
pub use simulated_fleet::SimulatedFleet;
