// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The `serve` command: store connection, liveness monitor, stdio loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::time::Instant;
use tracing::{info, warn};

use swarmlink_core::application::{CoordinationService, LivenessMonitor};
use swarmlink_core::domain::config::BrokerConfig;
use swarmlink_core::infrastructure::store::RedisStore;
use swarmlink_core::presentation::{stdio, Dispatcher};

pub async fn run(store_url: Option<String>) -> Result<()> {
    let mut config = BrokerConfig::from_env();
    if let Some(url) = store_url {
        config.store_url = url;
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    let store = connect_with_deadline(&config).await?;

    let service = Arc::new(CoordinationService::new(Arc::new(store), config));
    let monitor = LivenessMonitor::new(service.clone()).spawn();

    let result = stdio::serve(Dispatcher::new(service)).await;

    monitor.abort();
    info!("broker shut down");
    result
}

/// Retries the store connection until `STORE_RECONNECT_DEADLINE` passes,
/// then gives up so the process exits non-zero.
async fn connect_with_deadline(config: &BrokerConfig) -> Result<RedisStore> {
    let deadline = Instant::now() + config.store_reconnect_deadline;
    let retry_delay = Duration::from_secs(1);
    loop {
        match RedisStore::connect(&config.store_url).await {
            Ok(store) => {
                info!(url = %config.store_url, "connected to store");
                return Ok(store);
            }
            Err(err) if Instant::now() + retry_delay < deadline => {
                warn!(error = %err, "store not reachable yet; retrying");
                tokio::time::sleep(retry_delay).await;
            }
            Err(err) => {
                return Err(anyhow::Error::new(err)).with_context(|| {
                    format!(
                        "store at {} unreachable for more than {}s",
                        config.store_url,
                        config.store_reconnect_deadline.as_secs()
                    )
                });
            }
        }
    }
}
