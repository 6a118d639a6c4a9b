// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Inter-agent messaging: direct queries, responses, queue drains and
//! broadcasts.
//!
//! `query_agent` with `wait_for_response` is the only intentionally
//! blocking operation in the broker. The caller parks on a store-backed
//! pending record plus an in-process `Notify` fast path (check-then-wait:
//! the record is written *before* the query envelope is published, so a
//! responder can never win a race against the parker's slot).

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::warn;

use crate::domain::message::{Envelope, PendingQuery, PendingState};
use crate::domain::store::keys;

use super::service::{CoordinationError, CoordinationService};

/// How long an answered or failed pending record lingers for its parker.
const PENDING_LINGER: Duration = Duration::from_secs(60);

impl CoordinationService {
    #[allow(clippy::too_many_arguments)]
    pub async fn query_agent(
        &self,
        project_id: &str,
        from_session: &str,
        to_session: &str,
        query_type: &str,
        query: &str,
        wait_for_response: bool,
        timeout_secs: i64,
    ) -> Result<Value, CoordinationError> {
        if self.load_agent(project_id, to_session).await?.is_none() {
            return Ok(json!({
                "status": "agent_not_found",
                "error": format!("Agent {to_session} not found in project {project_id}"),
            }));
        }

        let message_id = format!("{from_session}-{}", Utc::now().timestamp_millis());
        let envelope = Envelope::Query {
            id: message_id.clone(),
            from: from_session.to_string(),
            query_type: query_type.to_string(),
            content: query.to_string(),
            timestamp: Utc::now(),
            requires_response: wait_for_response,
        };

        let timeout = Duration::from_secs(
            timeout_secs.clamp(0, self.config.query_max_timeout.as_secs() as i64) as u64,
        );

        // Pre-register the waiter slot and the pending record before the
        // query becomes visible to the target.
        let (pending_key, notify) = if wait_for_response {
            let pending_key = keys::pending(project_id, &message_id);
            let record = PendingQuery {
                message_id: message_id.clone(),
                from_session: from_session.to_string(),
                to_session: to_session.to_string(),
                created_at: Utc::now(),
                timeout_at: Utc::now()
                    + chrono::Duration::from_std(timeout).unwrap_or_else(|_| chrono::Duration::zero()),
                state: PendingState::Waiting,
                response: None,
                response_envelope: None,
            };
            self.store
                .set_expiring(
                    &pending_key,
                    &serde_json::to_string(&record)?,
                    timeout + PENDING_LINGER,
                )
                .await?;
            (Some(pending_key), Some(self.pending.register(&message_id)))
        } else {
            (None, None)
        };

        self.store
            .list_push_capped(
                &keys::messages(project_id, to_session),
                &serde_json::to_string(&envelope)?,
                self.config.max_queue_len,
                &Envelope::overflow_sentinel_json(),
            )
            .await?;
        self.touch_heartbeat(project_id, from_session).await?;

        let (Some(pending_key), Some(notify)) = (pending_key, notify) else {
            return Ok(json!({
                "status": "sent",
                "message_id": message_id,
                "message": format!(
                    "Query delivered to {to_session}; the response will arrive via check_messages."
                ),
            }));
        };

        let deadline = tokio::time::Instant::now() + timeout;
        let result = loop {
            if let Some(raw) = self.store.get(&pending_key).await? {
                match serde_json::from_str::<PendingQuery>(&raw) {
                    Ok(record) => match record.state {
                        PendingState::Answered => {
                            // The response envelope was also queued for the
                            // async path; reclaim it so drains never see it.
                            if let Some(envelope_json) = &record.response_envelope {
                                let _ = self
                                    .store
                                    .list_remove(
                                        &keys::messages(project_id, from_session),
                                        envelope_json,
                                    )
                                    .await;
                            }
                            break json!({
                                "status": "received",
                                "response": record.response.unwrap_or_default(),
                            });
                        }
                        PendingState::AgentNotFound => {
                            break json!({
                                "status": "agent_not_found",
                                "error": format!(
                                    "Agent {to_session} is no longer registered in project {project_id}"
                                ),
                            });
                        }
                        PendingState::Waiting => {}
                    },
                    Err(err) => {
                        warn!(%message_id, error = %err, "corrupt pending-query record")
                    }
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                break json!({
                    "status": "timeout",
                    "error": format!(
                        "No response received within {} seconds",
                        timeout.as_secs()
                    ),
                });
            }
            let nap = self.config.query_poll_interval.min(deadline - now);
            tokio::select! {
                _ = notify.notified() => {}
                _ = tokio::time::sleep(nap) => {}
            }
        };

        self.pending.unregister(&message_id);
        let _ = self.store.delete(&pending_key).await;
        Ok(result)
    }

    /// Writes the response into the pending record (waking any parked
    /// caller) *and* appends a response envelope to the original sender's
    /// queue, because the sender may have chosen `wait_for_response=false`
    /// and will pick it up via `check_messages`.
    pub async fn respond_to_query(
        &self,
        project_id: &str,
        from_session: &str,
        to_session: &str,
        message_id: &str,
        response: &str,
    ) -> Result<Value, CoordinationError> {
        let envelope = Envelope::Response {
            id: format!("response-{message_id}"),
            from: from_session.to_string(),
            in_reply_to: message_id.to_string(),
            content: response.to_string(),
            timestamp: Utc::now(),
        };
        let envelope_json = serde_json::to_string(&envelope)?;

        // Queue first: once the pending record flips to Answered, the woken
        // parker must be able to find (and remove) the envelope.
        self.store
            .list_push_capped(
                &keys::messages(project_id, to_session),
                &envelope_json,
                self.config.max_queue_len,
                &Envelope::overflow_sentinel_json(),
            )
            .await?;

        let pending_key = keys::pending(project_id, message_id);
        if let Some(raw) = self.store.get(&pending_key).await? {
            if let Ok(mut record) = serde_json::from_str::<PendingQuery>(&raw) {
                if record.state == PendingState::Waiting {
                    record.state = PendingState::Answered;
                    record.response = Some(response.to_string());
                    record.response_envelope = Some(envelope_json);
                    self.store
                        .set_expiring(
                            &pending_key,
                            &serde_json::to_string(&record)?,
                            PENDING_LINGER,
                        )
                        .await?;
                }
            }
        }
        self.pending.notify(message_id);
        self.touch_heartbeat(project_id, from_session).await?;

        Ok(json!({
            "status": "response_sent",
            "to": to_session,
            "message": format!("Response delivered to {to_session}."),
        }))
    }

    /// Drains the caller's queue: the read and the clear are one atomic
    /// store step, so two concurrent drains return disjoint sets.
    pub async fn check_messages(
        &self,
        project_id: &str,
        session_name: &str,
    ) -> Result<Value, CoordinationError> {
        let raw = self
            .store
            .list_take(&keys::messages(project_id, session_name))
            .await?;
        let messages: Vec<Value> = raw
            .iter()
            .filter_map(|entry| match serde_json::from_str(entry) {
                Ok(message) => Some(message),
                Err(err) => {
                    warn!(%session_name, error = %err, "dropping unparseable message");
                    None
                }
            })
            .collect();
        self.touch_heartbeat(project_id, session_name).await?;
        Ok(Value::Array(messages))
    }

    pub async fn broadcast_message(
        &self,
        project_id: &str,
        session_name: &str,
        message_type: &str,
        content: &str,
    ) -> Result<Value, CoordinationError> {
        let envelope = Envelope::broadcast(session_name, message_type, content.to_string());
        let recipients = self
            .fan_out(project_id, &envelope, Some(session_name))
            .await?;
        self.touch_heartbeat(project_id, session_name).await?;
        Ok(json!({
            "status": "broadcast_sent",
            "recipients": recipients,
            "message": format!("Broadcast delivered to {recipients} agents."),
        }))
    }

    /// Fails every pending query that was waiting on `session_name`. Called
    /// by the liveness monitor after a reap so parked callers return
    /// `agent_not_found` instead of idling into their timeout.
    pub(crate) async fn fail_pending_for(
        &self,
        project_id: &str,
        session_name: &str,
    ) -> Result<(), CoordinationError> {
        for key in self.store.scan(&keys::pending_pattern(project_id)).await? {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            let Ok(mut record) = serde_json::from_str::<PendingQuery>(&raw) else {
                continue;
            };
            if record.to_session == session_name && record.state == PendingState::Waiting {
                record.state = PendingState::AgentNotFound;
                self.store
                    .set_expiring(&key, &serde_json::to_string(&record)?, PENDING_LINGER)
                    .await?;
                self.pending.notify(&record.message_id);
            }
        }
        Ok(())
    }
}
