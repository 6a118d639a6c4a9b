// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;
