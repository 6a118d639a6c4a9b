// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod stdio;
pub mod tools;

pub use tools::{tool_catalogue, Dispatcher, ToolDef};
