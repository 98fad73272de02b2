// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure value types and collaborator contracts. The only I/O-adjacent type is
//! [`bus::EventReceiver`], a thin wrapper over a broadcast receiver.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`agent`] | `AgentId` |
//! | [`job`] | `JobId`, `JobIdGenerator`, `Target`, `JobRequest`, `JobAck` |
//! | [`transport`] | `JobClient`, `TransportError` |
//! | [`bus`] | `EventBus`, `BusEvent`, `JobReturn`, tag helpers |
//! | [`batch_options`] | `BatchOptions`, `BatchTuning`, `BatchSpec`, `BatchSize` |
//! | [`fleet_config`] | `FleetConfigManifest` |

pub mod agent;
pub mod job;
pub mod transport;
pub mod bus;
pub mod batch_options;
pub mod fleet_config;
