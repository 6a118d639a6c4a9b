// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Broker configuration.
//!
//! Built from environment variables with production defaults; unparseable
//! values fall back to the default for that knob. `LOG_LEVEL` is consumed by
//! the binary's subscriber setup, not here.

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// `STORE_URL` - Redis-compatible store endpoint.
    pub store_url: String,
    /// `HEARTBEAT_TIMEOUT` (seconds) - TTL on heartbeat keys; expiry is how
    /// agent death is detected.
    pub heartbeat_timeout: Duration,
    /// `MONITOR_INTERVAL` (seconds) - liveness monitor sweep cadence.
    pub monitor_interval: Duration,
    /// `STATUS_DIR` - directory for best-effort completion marker files.
    pub status_dir: PathBuf,
    /// `MAX_QUEUE_LEN` - per-agent message queue bound.
    pub max_queue_len: usize,
    /// `RECENT_CHANGES_CAP` - per-project recent-changes log bound.
    pub recent_changes_cap: usize,
    /// `STORE_RECONNECT_DEADLINE` (seconds) - how long the broker retries an
    /// unreachable store at startup before exiting non-zero.
    pub store_reconnect_deadline: Duration,
    /// `QUERY_POLL_INTERVAL_MS` - parked-query store poll cadence (the
    /// in-process notify table is only the fast path).
    pub query_poll_interval: Duration,
    pub query_default_timeout: Duration,
    pub query_max_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            store_url: "redis://localhost:6379".to_string(),
            heartbeat_timeout: Duration::from_secs(90),
            monitor_interval: Duration::from_secs(30),
            status_dir: PathBuf::from("/tmp/swarmlink-status"),
            max_queue_len: 1000,
            recent_changes_cap: 100,
            store_reconnect_deadline: Duration::from_secs(30),
            query_poll_interval: Duration::from_millis(250),
            query_default_timeout: Duration::from_secs(30),
            query_max_timeout: Duration::from_secs(300),
        }
    }
}

impl BrokerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            store_url: env_string("STORE_URL").unwrap_or(defaults.store_url),
            heartbeat_timeout: env_secs("HEARTBEAT_TIMEOUT").unwrap_or(defaults.heartbeat_timeout),
            monitor_interval: env_secs("MONITOR_INTERVAL").unwrap_or(defaults.monitor_interval),
            status_dir: env_string("STATUS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.status_dir),
            max_queue_len: env_usize("MAX_QUEUE_LEN").unwrap_or(defaults.max_queue_len),
            recent_changes_cap: env_usize("RECENT_CHANGES_CAP")
                .unwrap_or(defaults.recent_changes_cap),
            store_reconnect_deadline: env_secs("STORE_RECONNECT_DEADLINE")
                .unwrap_or(defaults.store_reconnect_deadline),
            query_poll_interval: env_millis("QUERY_POLL_INTERVAL_MS")
                .unwrap_or(defaults.query_poll_interval),
            query_default_timeout: defaults.query_default_timeout,
            query_max_timeout: defaults.query_max_timeout,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_url.is_empty() {
            return Err(ConfigError::Invalid("STORE_URL must not be empty"));
        }
        if self.heartbeat_timeout.is_zero() {
            return Err(ConfigError::Invalid("HEARTBEAT_TIMEOUT must be positive"));
        }
        if self.monitor_interval.is_zero() {
            return Err(ConfigError::Invalid("MONITOR_INTERVAL must be positive"));
        }
        // The overflow sentinel occupies a queue slot; a cap below 2 could
        // hold nothing but the sentinel.
        if self.max_queue_len < 2 {
            return Err(ConfigError::Invalid("MAX_QUEUE_LEN must be at least 2"));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_string(name)?.parse::<u64>().ok().map(Duration::from_secs)
}

fn env_millis(name: &str) -> Option<Duration> {
    env_string(name)?.parse::<u64>().ok().map(Duration::from_millis)
}

fn env_usize(name: &str) -> Option<usize> {
    env_string(name)?.parse::<usize>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let config = BrokerConfig::default();
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(90));
        assert_eq!(config.monitor_interval, Duration::from_secs(30));
        assert_eq!(config.max_queue_len, 1000);
        assert_eq!(config.recent_changes_cap, 100);
        assert_eq!(config.store_url, "redis://localhost:6379");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_heartbeat_rejected() {
        let config = BrokerConfig {
            heartbeat_timeout: Duration::ZERO,
            ..BrokerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_queue_cap_rejected() {
        let config = BrokerConfig {
            max_queue_len: 1,
            ..BrokerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
