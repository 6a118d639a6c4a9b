// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Shared interface registry handlers.

use serde_json::{json, Map, Value};
use tracing::info;

use crate::domain::interface::{similar_names, InterfaceRecord};
use crate::domain::message::Envelope;
use crate::domain::store::keys;

use super::service::{CoordinationError, CoordinationService};

impl CoordinationService {
    /// Registers (or overwrites) a shared type/interface definition.
    /// Definitions are project-owned and survive the registering agent.
    pub async fn register_interface(
        &self,
        project_id: &str,
        session_name: &str,
        interface_name: &str,
        definition: &str,
        file_path: Option<&str>,
    ) -> Result<Value, CoordinationError> {
        let record = InterfaceRecord::new(session_name, definition, file_path);
        self.store
            .hash_set(
                &keys::interfaces(project_id),
                interface_name,
                &serde_json::to_string(&record)?,
            )
            .await?;
        self.fan_out(
            project_id,
            &Envelope::broadcast(
                session_name,
                "interface_registered",
                format!("{session_name} registered interface {interface_name}"),
            ),
            Some(session_name),
        )
        .await?;
        self.touch_heartbeat(project_id, session_name).await?;

        info!(%project_id, %session_name, %interface_name, "interface registered");

        Ok(json!({
            "status": "registered",
            "interface_name": interface_name,
            "message": "Interface registered and available to all agents.",
        }))
    }

    /// Exact lookup; on a miss the reply carries deterministically ordered
    /// near-matches so a misspelled name is still discoverable.
    pub async fn query_interface(
        &self,
        project_id: &str,
        interface_name: &str,
    ) -> Result<Value, CoordinationError> {
        let interfaces_key = keys::interfaces(project_id);
        match self.store.hash_get(&interfaces_key, interface_name).await? {
            Some(raw) => {
                let record: Value = serde_json::from_str(&raw)?;
                let mut result = record.as_object().cloned().unwrap_or_default();
                result.insert("status".to_string(), json!("found"));
                result.insert("interface_name".to_string(), json!(interface_name));
                Ok(Value::Object(result))
            }
            None => {
                let names = self.store.hash_keys(&interfaces_key).await?;
                let similar = similar_names(interface_name, names.iter().map(String::as_str));
                Ok(json!({
                    "status": "not_found",
                    "error": format!("Interface {interface_name} not found"),
                    "similar": similar,
                }))
            }
        }
    }

    pub async fn list_interfaces(&self, project_id: &str) -> Result<Value, CoordinationError> {
        let interfaces = self
            .store
            .hash_get_all(&keys::interfaces(project_id))
            .await?;
        let mut result = Map::new();
        for (name, raw) in interfaces {
            if let Ok(record) = serde_json::from_str::<Value>(&raw) {
                result.insert(name, record);
            }
        }
        Ok(Value::Object(result))
    }
}
