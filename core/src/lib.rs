// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarmlink Core
//!
//! Coordination engine for fleets of independently executing AI coding
//! agents that share a codebase. Agents are separate processes (possibly on
//! separate hosts) and never call each other directly: each one connects to
//! the broker over a stdio tool-call transport and invokes a fixed set of
//! coordination primitives. All shared state lives in a Redis-compatible
//! key-value store, scoped per project.
//!
//! # Architecture
//!
//! - **domain** - entities and ports: agent records, todos, message
//!   envelopes, advisory locks, the interface registry, and the [`Store`]
//!   trait the engine persists through.
//! - **application** - the coordination handlers behind the ~17 tools, the
//!   pending-query table and the liveness monitor.
//! - **infrastructure** - `Store` backends: in-memory (tests, development)
//!   and Redis (production).
//! - **presentation** - the tool catalogue, the dispatcher and the
//!   line-delimited JSON-RPC stdio loop.
//!
//! [`Store`]: domain::store::Store

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
