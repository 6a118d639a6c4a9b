// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Liveness monitor.
//!
//! A single background task that sweeps every project on a fixed interval
//! and reaps agents whose heartbeat TTL has lapsed: locks released, a
//! system entry in recent-changes, an `agent_died` broadcast to survivors,
//! parked queries against the corpse woken with `agent_not_found`, and the
//! agent's state deleted. The sweep shares its cleanup with
//! `unregister_agent`, so the two racing is harmless - the loser finds
//! nothing left to do. Running a second broker process against the same
//! store is equally safe for the same reason.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

use crate::domain::lock::ChangeRecord;
use crate::domain::message::Envelope;
use crate::domain::store::keys;

use super::service::{CoordinationError, CoordinationService};

pub struct LivenessMonitor {
    service: Arc<CoordinationService>,
}

impl LivenessMonitor {
    pub fn new(service: Arc<CoordinationService>) -> Self {
        Self { service }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.service.config().monitor_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match self.sweep().await {
                    Ok(0) => debug!("liveness sweep: all agents alive"),
                    Ok(reaped) => warn!(reaped, "liveness sweep reaped dead agents"),
                    Err(err) => error!(error = %err, "liveness sweep failed"),
                }
            }
        })
    }

    /// One full pass over every project. Exposed separately from `spawn` so
    /// tests can drive ticks deterministically.
    pub async fn sweep(&self) -> Result<usize, CoordinationError> {
        let mut reaped = 0;
        for agents_key in self
            .service
            .store()
            .scan(keys::all_agents_pattern())
            .await?
        {
            let Some(project_id) = keys::project_of(&agents_key) else {
                continue;
            };
            let project_id = project_id.to_string();
            let agents = self.service.store().hash_get_all(&agents_key).await?;
            for session_name in agents.into_keys() {
                let heartbeat = match self
                    .service
                    .store()
                    .get(&keys::heartbeat(&project_id, &session_name))
                    .await
                {
                    Ok(heartbeat) => heartbeat,
                    Err(err) => {
                        error!(%project_id, %session_name, error = %err, "heartbeat read failed");
                        continue;
                    }
                };
                if heartbeat.is_some() {
                    continue;
                }
                // One agent's cleanup failure must not stall reaping the
                // rest.
                match self.reap(&project_id, &session_name).await {
                    Ok(()) => {
                        warn!(%project_id, %session_name, "reaped dead agent");
                        reaped += 1;
                    }
                    Err(err) => {
                        error!(%project_id, %session_name, error = %err, "failed to reap agent")
                    }
                }
            }
        }
        Ok(reaped)
    }

    async fn reap(&self, project_id: &str, session_name: &str) -> Result<(), CoordinationError> {
        let released = self.service.purge_agent(project_id, session_name).await?;
        self.service
            .record_change(
                project_id,
                &ChangeRecord::system(format!(
                    "agent {session_name} reaped after heartbeat expiry ({} locks released)",
                    released.len()
                )),
            )
            .await?;
        self.service
            .fan_out(
                project_id,
                &Envelope::broadcast(
                    session_name,
                    "agent_died",
                    format!("Agent {session_name} died (heartbeat expired); its locks were released"),
                ),
                Some(session_name),
            )
            .await?;
        self.service
            .fail_pending_for(project_id, session_name)
            .await?;
        Ok(())
    }
}
