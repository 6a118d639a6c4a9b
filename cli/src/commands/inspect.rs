// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Read-only inspection commands against a live store.

use anyhow::{Context, Result};
use colored::Colorize;

use swarmlink_core::domain::agent::{AgentRecord, AgentStatus};
use swarmlink_core::domain::config::BrokerConfig;
use swarmlink_core::domain::lock::ChangeRecord;
use swarmlink_core::domain::store::{keys, Store};
use swarmlink_core::infrastructure::store::RedisStore;
use swarmlink_core::presentation::tool_catalogue;

pub fn tools() -> Result<()> {
    for tool in tool_catalogue() {
        println!("{}", tool.name.bold());
        println!("    {}", tool.description.dimmed());
    }
    Ok(())
}

pub async fn agents(store_url: Option<String>, project: &str) -> Result<()> {
    let store = connect(store_url).await?;
    let agents = store
        .hash_get_all(&keys::agents(project))
        .await
        .context("Failed to read agent registry")?;

    if agents.is_empty() {
        println!("{}", format!("No agents registered in project {project}").yellow());
        return Ok(());
    }

    let mut sessions: Vec<_> = agents.into_iter().collect();
    sessions.sort_by(|a, b| a.0.cmp(&b.0));
    for (session, raw) in sessions {
        match serde_json::from_str::<AgentRecord>(&raw) {
            Ok(record) => {
                let status = match record.status {
                    AgentStatus::Active => "active".green(),
                    AgentStatus::Completed => "completed".blue(),
                };
                println!(
                    "{}  task={} branch={} [{}]",
                    session.cyan().bold(),
                    record.task_id,
                    record.branch,
                    status
                );
                println!("    {}", record.description.dimmed());
            }
            Err(_) => println!("{}  {}", session.cyan().bold(), "<unreadable record>".red()),
        }
    }
    Ok(())
}

pub async fn changes(store_url: Option<String>, project: &str, limit: i64) -> Result<()> {
    let store = connect(store_url).await?;
    let limit = limit.max(0);
    if limit == 0 {
        return Ok(());
    }
    let entries = store
        .list_range(&keys::recent_changes(project), 0, limit - 1)
        .await
        .context("Failed to read recent changes")?;

    if entries.is_empty() {
        println!("{}", format!("No recent changes in project {project}").yellow());
        return Ok(());
    }

    for raw in entries {
        let Ok(change) = serde_json::from_str::<ChangeRecord>(&raw) else {
            continue;
        };
        let path = change.file_path.as_deref().unwrap_or("-");
        println!(
            "{}  {} {} {}",
            change.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
            change.session_name.cyan(),
            change.change_type.bold(),
            path
        );
        println!("    {}", change.description.dimmed());
    }
    Ok(())
}

async fn connect(store_url: Option<String>) -> Result<RedisStore> {
    let mut config = BrokerConfig::from_env();
    if let Some(url) = store_url {
        config.store_url = url;
    }
    RedisStore::connect(&config.store_url)
        .await
        .with_context(|| format!("Failed to connect to store at {}", config.store_url))
}
