// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inter-agent message envelopes.
//!
//! Every message delivered through a per-agent queue is one of four envelope
//! kinds, serialized as JSON with a `type` discriminator. Queues are FIFO and
//! bounded; on overflow the oldest entry is dropped and a single
//! [`Envelope::overflow_sentinel`] takes the head slot so the reader knows
//! messages were lost.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The structured wrapper around every inter-agent message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// A direct question from one agent to another. `requires_response`
    /// mirrors the sender's `wait_for_response` choice.
    Query {
        id: String,
        from: String,
        query_type: String,
        content: String,
        timestamp: DateTime<Utc>,
        requires_response: bool,
    },
    /// The answer to a query, correlated through `in_reply_to`.
    Response {
        id: String,
        from: String,
        in_reply_to: String,
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// Fan-out to every other active agent in the project.
    Broadcast {
        from: String,
        message_type: String,
        content: String,
        timestamp: DateTime<Utc>,
    },
    /// Broker-originated notice (e.g. the overflow sentinel).
    System {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
}

pub const OVERFLOW_NOTICE: &str = "messages dropped";

impl Envelope {
    /// The queue-overflow sentinel. Must serialize to the exact same bytes
    /// every time: overflow coalescing compares the stored head entry
    /// against this serialization to avoid stacking duplicates.
    pub fn overflow_sentinel() -> Self {
        Envelope::System {
            content: OVERFLOW_NOTICE.to_string(),
            timestamp: None,
        }
    }

    pub fn overflow_sentinel_json() -> String {
        // Infallible: the sentinel contains no non-serializable state.
        serde_json::to_string(&Self::overflow_sentinel()).expect("sentinel serializes")
    }

    pub fn broadcast(from: &str, message_type: &str, content: String) -> Self {
        Envelope::Broadcast {
            from: from.to_string(),
            message_type: message_type.to_string(),
            content,
            timestamp: Utc::now(),
        }
    }
}

/// An outstanding synchronous `query_agent`, persisted so that any broker
/// process against the same store can correlate the response back to the
/// parked caller. Records carry their own TTL; expiry is the garbage
/// collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingQuery {
    pub message_id: String,
    pub from_session: String,
    pub to_session: String,
    pub created_at: DateTime<Utc>,
    pub timeout_at: DateTime<Utc>,
    pub state: PendingState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    /// Exact serialization of the response envelope pushed to the sender's
    /// queue, kept so the woken parker can remove it again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_envelope: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingState {
    Waiting,
    Answered,
    AgentNotFound,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_with_type_tag() {
        let envelope = Envelope::broadcast("task-001", "info", "Agent task-001 joined".into());
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["type"], "broadcast");
        assert_eq!(json["from"], "task-001");
        assert_eq!(json["message_type"], "info");
    }

    #[test]
    fn query_round_trips() {
        let envelope = Envelope::Query {
            id: "task-002-1700000000000".into(),
            from: "task-002".into(),
            query_type: "api".into(),
            content: "what is the return type?".into(),
            timestamp: Utc::now(),
            requires_response: true,
        };
        let json = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn sentinel_bytes_are_stable() {
        let a = Envelope::overflow_sentinel_json();
        let b = Envelope::overflow_sentinel_json();
        assert_eq!(a, b);
        assert_eq!(a, r#"{"type":"system","content":"messages dropped"}"#);
    }
}
