// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod interfaces;
pub mod locks;
pub mod messaging;
pub mod monitor;
pub mod pending;
pub mod registry;
pub mod service;
pub mod todos;

pub use monitor::LivenessMonitor;
pub use pending::PendingQueries;
pub use service::{CoordinationError, CoordinationService};
