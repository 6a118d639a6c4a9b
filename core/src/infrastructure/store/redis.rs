// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Redis [`Store`] backend.
//!
//! Thin wrapper over a tokio `ConnectionManager` (the manager handles
//! reconnection internally). Multi-key groups go through `MULTI`/`EXEC`
//! pipelines; the bounded queue push runs as a Lua script so the
//! drop-oldest + sentinel dance stays atomic even with several broker
//! processes on the same store. Every command is retried up to three times
//! with exponential backoff before surfacing `StoreError::Unavailable`.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::warn;

use crate::domain::store::{Store, StoreError, StoreResult, WriteOp};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

// RPUSH + drop-oldest + coalesced sentinel, atomically.
const QUEUE_PUSH_LUA: &str = r#"
redis.call('RPUSH', KEYS[1], ARGV[1])
local cap = tonumber(ARGV[2])
local len = redis.call('LLEN', KEYS[1])
if len <= cap then
  return 0
end
redis.call('LTRIM', KEYS[1], len - cap, -1)
if redis.call('LINDEX', KEYS[1], 0) ~= ARGV[3] then
  redis.call('LTRIM', KEYS[1], 1, -1)
  redis.call('LPUSH', KEYS[1], ARGV[3])
end
return 1
"#;

#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    queue_push: Script,
}

impl RedisStore {
    /// Connects once. Callers that want a startup grace period retry this
    /// themselves against their reconnect deadline.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(unavailable)?;
        let manager = ConnectionManager::new(client).await.map_err(unavailable)?;
        Ok(Self {
            manager,
            queue_push: Script::new(QUEUE_PUSH_LUA),
        })
    }

    async fn with_retry<T, F, Fut>(&self, mut op: F) -> StoreResult<T>
    where
        F: FnMut(ConnectionManager) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        let mut delay = RETRY_BASE_DELAY;
        let mut last_error = None;
        for attempt in 0..RETRY_ATTEMPTS {
            match op(self.manager.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(attempt, error = %err, "store command failed");
                    last_error = Some(err);
                    if attempt + 1 < RETRY_ATTEMPTS {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }
        Err(StoreError::Unavailable(
            last_error
                .map(|err| err.to_string())
                .unwrap_or_else(|| "unknown failure".to_string()),
        ))
    }
}

fn unavailable(err: redis::RedisError) -> StoreError {
    StoreError::Unavailable(err.to_string())
}

#[async_trait]
impl Store for RedisStore {
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.with_retry(move |mut conn| async move { conn.hget(key, field).await })
            .await
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        self.with_retry(move |mut conn| async move { conn.hset(key, field, value).await })
            .await
    }

    async fn hash_set_nx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        self.with_retry(move |mut conn| async move { conn.hset_nx(key, field, value).await })
            .await
    }

    async fn hash_del(&self, key: &str, field: &str) -> StoreResult<bool> {
        let removed: i64 = self
            .with_retry(move |mut conn| async move { conn.hdel(key, field).await })
            .await?;
        Ok(removed > 0)
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.with_retry(move |mut conn| async move { conn.hgetall(key).await })
            .await
    }

    async fn hash_keys(&self, key: &str) -> StoreResult<Vec<String>> {
        self.with_retry(move |mut conn| async move { conn.hkeys(key).await })
            .await
    }

    async fn list_push_back(&self, key: &str, value: &str) -> StoreResult<()> {
        self.with_retry(move |mut conn| async move { conn.rpush(key, value).await })
            .await
    }

    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        sentinel: &str,
    ) -> StoreResult<bool> {
        let script = &self.queue_push;
        let dropped: i64 = self
            .with_retry(move |mut conn| async move {
                script
                    .key(key)
                    .arg(value)
                    .arg(cap as i64)
                    .arg(sentinel)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        Ok(dropped > 0)
    }

    async fn list_push_front_trimmed(
        &self,
        key: &str,
        value: &str,
        cap: usize,
    ) -> StoreResult<()> {
        self.with_retry(move |mut conn| async move {
            let mut pipe = redis::pipe();
            pipe.atomic();
            pipe.lpush(key, value).ignore();
            pipe.ltrim(key, 0, cap as isize - 1).ignore();
            pipe.query_async(&mut conn).await
        })
        .await
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        self.with_retry(move |mut conn| async move {
            conn.lrange(key, start as isize, stop as isize).await
        })
        .await
    }

    async fn list_take(&self, key: &str) -> StoreResult<Vec<String>> {
        let (items, _deleted): (Vec<String>, i64) = self
            .with_retry(move |mut conn| async move {
                let mut pipe = redis::pipe();
                pipe.atomic();
                pipe.lrange(key, 0, -1);
                pipe.del(key);
                pipe.query_async(&mut conn).await
            })
            .await?;
        Ok(items)
    }

    async fn list_remove(&self, key: &str, value: &str) -> StoreResult<bool> {
        let removed: i64 = self
            .with_retry(move |mut conn| async move { conn.lrem(key, 1, value).await })
            .await?;
        Ok(removed > 0)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.with_retry(move |mut conn| async move { conn.set(key, value).await })
            .await
    }

    async fn set_expiring(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let seconds = ttl.as_secs().max(1);
        self.with_retry(move |mut conn| async move { conn.set_ex(key, value, seconds).await })
            .await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_retry(move |mut conn| async move { conn.get(key).await })
            .await
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.with_retry(move |mut conn| async move { conn.del(key).await })
            .await
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        self.with_retry(move |mut conn| async move { conn.keys(pattern).await })
            .await
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        let ops = &ops;
        self.with_retry(move |mut conn| async move {
            let mut pipe = redis::pipe();
            pipe.atomic();
            for op in ops {
                match op {
                    WriteOp::HashSet { key, field, value } => {
                        pipe.hset(key, field, value).ignore();
                    }
                    WriteOp::HashDel { key, field } => {
                        pipe.hdel(key, field).ignore();
                    }
                    WriteOp::ListPushBack { key, value } => {
                        pipe.rpush(key, value).ignore();
                    }
                    WriteOp::SetExpiring { key, value, ttl } => {
                        pipe.set_ex(key, value, ttl.as_secs().max(1)).ignore();
                    }
                    WriteOp::Delete { key } => {
                        pipe.del(key).ignore();
                    }
                }
            }
            pipe.query_async(&mut conn).await
        })
        .await
    }
}
