// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Process-wide pending-query table.
//!
//! Synchronous `query_agent` callers park on a per-`message_id`
//! `tokio::sync::Notify`; `respond_to_query` and the liveness monitor poke
//! it after writing the outcome into the store-backed pending record. The
//! table is only the fast path - parked callers also poll the record, so a
//! response landing through a *different* broker process still wakes them
//! within one poll interval.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct PendingQueries {
    notifiers: Arc<Mutex<HashMap<String, Arc<Notify>>>>,
}

impl PendingQueries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter slot before the query is published, so a responder
    /// arriving first leaves a stored permit rather than a lost wakeup.
    pub fn register(&self, message_id: &str) -> Arc<Notify> {
        let mut notifiers = self.guard();
        notifiers
            .entry(message_id.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub fn notify(&self, message_id: &str) {
        if let Some(notify) = self.guard().get(message_id) {
            notify.notify_one();
        }
    }

    pub fn unregister(&self, message_id: &str) {
        self.guard().remove(message_id);
    }

    fn guard(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Notify>>> {
        // A poisoned table just means a waiter panicked; the map itself is
        // still coherent.
        self.notifiers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
