// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! In-memory [`Store`] backend for tests and single-process development.
//!
//! One mutex over a flat key map; every trait method (including `apply` and
//! `list_take`) runs under a single lock acquisition, which is what makes
//! the atomicity guarantees trivial here. TTLs are enforced lazily on
//! access.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::store::{Store, StoreError, StoreResult, WriteOp};

#[derive(Debug, Clone)]
enum Entry {
    Str {
        value: String,
        expires_at: Option<Instant>,
    },
    Hash(HashMap<String, String>),
    List(VecDeque<String>),
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<String, Entry>>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("mutex poisoned".to_string()))
    }
}

fn purge_if_expired(map: &mut HashMap<String, Entry>, key: &str) {
    if let Some(Entry::Str {
        expires_at: Some(at),
        ..
    }) = map.get(key)
    {
        if *at <= Instant::now() {
            map.remove(key);
        }
    }
}

fn hash_mut<'a>(
    map: &'a mut HashMap<String, Entry>,
    key: &str,
) -> StoreResult<&'a mut HashMap<String, String>> {
    match map
        .entry(key.to_string())
        .or_insert_with(|| Entry::Hash(HashMap::new()))
    {
        Entry::Hash(hash) => Ok(hash),
        _ => Err(wrong_type(key)),
    }
}

fn list_mut<'a>(
    map: &'a mut HashMap<String, Entry>,
    key: &str,
) -> StoreResult<&'a mut VecDeque<String>> {
    match map
        .entry(key.to_string())
        .or_insert_with(|| Entry::List(VecDeque::new()))
    {
        Entry::List(list) => Ok(list),
        _ => Err(wrong_type(key)),
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Unavailable(format!("wrong value type at key {key}"))
}

fn apply_op(map: &mut HashMap<String, Entry>, op: WriteOp) -> StoreResult<()> {
    match op {
        WriteOp::HashSet { key, field, value } => {
            hash_mut(map, &key)?.insert(field, value);
        }
        WriteOp::HashDel { key, field } => {
            let now_empty = match map.get_mut(&key) {
                Some(Entry::Hash(hash)) => {
                    hash.remove(&field);
                    hash.is_empty()
                }
                _ => false,
            };
            // Redis drops empty collections; mirror that.
            if now_empty {
                map.remove(&key);
            }
        }
        WriteOp::ListPushBack { key, value } => {
            list_mut(map, &key)?.push_back(value);
        }
        WriteOp::SetExpiring { key, value, ttl } => {
            map.insert(
                key,
                Entry::Str {
                    value,
                    expires_at: Some(Instant::now() + ttl),
                },
            );
        }
        WriteOp::Delete { key } => {
            map.remove(&key);
        }
    }
    Ok(())
}

fn range_bounds(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    if len == 0 {
        return None;
    }
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if start > stop || stop < 0 || start >= len {
        return None;
    }
    Some((start as usize, stop as usize))
}

#[async_trait]
impl Store for MemoryStore {
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let map = self.lock()?;
        match map.get(key) {
            Some(Entry::Hash(hash)) => Ok(hash.get(field).cloned()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let mut map = self.lock()?;
        hash_mut(&mut map, key)?.insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_set_nx(&self, key: &str, field: &str, value: &str) -> StoreResult<bool> {
        let mut map = self.lock()?;
        let hash = hash_mut(&mut map, key)?;
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hash_del(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut map = self.lock()?;
        let (removed, now_empty) = match map.get_mut(key) {
            Some(Entry::Hash(hash)) => (hash.remove(field).is_some(), hash.is_empty()),
            Some(_) => return Err(wrong_type(key)),
            None => (false, false),
        };
        if now_empty {
            map.remove(key);
        }
        Ok(removed)
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let map = self.lock()?;
        match map.get(key) {
            Some(Entry::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn hash_keys(&self, key: &str) -> StoreResult<Vec<String>> {
        let map = self.lock()?;
        match map.get(key) {
            Some(Entry::Hash(hash)) => Ok(hash.keys().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn list_push_back(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut map = self.lock()?;
        list_mut(&mut map, key)?.push_back(value.to_string());
        Ok(())
    }

    async fn list_push_capped(
        &self,
        key: &str,
        value: &str,
        cap: usize,
        sentinel: &str,
    ) -> StoreResult<bool> {
        let mut map = self.lock()?;
        let list = list_mut(&mut map, key)?;
        list.push_back(value.to_string());
        if list.len() <= cap {
            return Ok(false);
        }
        while list.len() > cap {
            list.pop_front();
        }
        if list.front().map(String::as_str) != Some(sentinel) {
            list.pop_front();
            list.push_front(sentinel.to_string());
        }
        Ok(true)
    }

    async fn list_push_front_trimmed(
        &self,
        key: &str,
        value: &str,
        cap: usize,
    ) -> StoreResult<()> {
        let mut map = self.lock()?;
        let list = list_mut(&mut map, key)?;
        list.push_front(value.to_string());
        list.truncate(cap);
        Ok(())
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let map = self.lock()?;
        let list = match map.get(key) {
            Some(Entry::List(list)) => list,
            Some(_) => return Err(wrong_type(key)),
            None => return Ok(Vec::new()),
        };
        Ok(match range_bounds(list.len(), start, stop) {
            Some((lo, hi)) => list.iter().skip(lo).take(hi - lo + 1).cloned().collect(),
            None => Vec::new(),
        })
    }

    async fn list_take(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut map = self.lock()?;
        match map.remove(key) {
            Some(Entry::List(list)) => Ok(list.into_iter().collect()),
            Some(other) => {
                map.insert(key.to_string(), other);
                Err(wrong_type(key))
            }
            None => Ok(Vec::new()),
        }
    }

    async fn list_remove(&self, key: &str, value: &str) -> StoreResult<bool> {
        let mut map = self.lock()?;
        let (removed, now_empty) = match map.get_mut(key) {
            Some(Entry::List(list)) => match list.iter().position(|item| item == value) {
                Some(pos) => {
                    list.remove(pos);
                    (true, list.is_empty())
                }
                None => (false, false),
            },
            _ => (false, false),
        };
        if now_empty {
            map.remove(key);
        }
        Ok(removed)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut map = self.lock()?;
        map.insert(
            key.to_string(),
            Entry::Str {
                value: value.to_string(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn set_expiring(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut map = self.lock()?;
        map.insert(
            key.to_string(),
            Entry::Str {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut map = self.lock()?;
        purge_if_expired(&mut map, key);
        match map.get(key) {
            Some(Entry::Str { value, .. }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut map = self.lock()?;
        let expired: Vec<String> = map
            .iter()
            .filter_map(|(key, entry)| match entry {
                Entry::Str {
                    expires_at: Some(at),
                    ..
                } if *at <= Instant::now() => Some(key.clone()),
                _ => None,
            })
            .collect();
        for key in expired {
            map.remove(&key);
        }
        let mut keys: Vec<String> = map
            .keys()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> StoreResult<()> {
        let mut map = self.lock()?;
        for op in ops {
            apply_op(&mut map, op)?;
        }
        Ok(())
    }
}

/// Redis-style glob matching, `*` wildcard only.
fn glob_match(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or("");
    if !key.starts_with(first) {
        return false;
    }
    let mut rest = &key[first.len()..];
    let mut segments: Vec<&str> = parts.collect();
    if segments.is_empty() {
        return rest.is_empty();
    }
    let last = segments.pop().unwrap_or("");
    for segment in segments {
        if segment.is_empty() {
            continue;
        }
        match rest.find(segment) {
            Some(at) => rest = &rest[at + segment.len()..],
            None => return false,
        }
    }
    rest.len() >= last.len() && rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_matches_project_patterns() {
        assert!(glob_match("project:*:agents", "project:p1:agents"));
        assert!(glob_match("project:p1:pending:*", "project:p1:pending:task-001-17"));
        assert!(!glob_match("project:*:agents", "project:p1:locks"));
        assert!(!glob_match("project:p1:pending:*", "project:p2:pending:x"));
        assert!(glob_match("exact", "exact"));
        assert!(!glob_match("exact", "exactly"));
    }

    #[tokio::test]
    async fn ttl_expires_lazily() {
        let store = MemoryStore::new();
        store
            .set_expiring("k", "v", Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn capped_push_inserts_one_sentinel() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let dropped = store
                .list_push_capped("q", &format!("m{i}"), 5, "<dropped>")
                .await
                .unwrap();
            assert!(!dropped);
        }
        assert!(store.list_push_capped("q", "m5", 5, "<dropped>").await.unwrap());
        let items = store.list_range("q", 0, -1).await.unwrap();
        assert_eq!(items.len(), 5);
        assert_eq!(items[0], "<dropped>");
        assert_eq!(items.last().unwrap(), "m5");

        // A second overflow reuses the sentinel instead of stacking another.
        assert!(store.list_push_capped("q", "m6", 5, "<dropped>").await.unwrap());
        let items = store.list_range("q", 0, -1).await.unwrap();
        assert_eq!(items.iter().filter(|m| *m == "<dropped>").count(), 1);
        assert_eq!(items[0], "<dropped>");
        assert_eq!(items.last().unwrap(), "m6");
    }

    #[tokio::test]
    async fn list_take_clears() {
        let store = MemoryStore::new();
        store.list_push_back("q", "a").await.unwrap();
        store.list_push_back("q", "b").await.unwrap();
        assert_eq!(store.list_take("q").await.unwrap(), vec!["a", "b"]);
        assert!(store.list_take("q").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn negative_range_indices() {
        let store = MemoryStore::new();
        for item in ["a", "b", "c", "d"] {
            store.list_push_back("l", item).await.unwrap();
        }
        assert_eq!(store.list_range("l", 0, -1).await.unwrap().len(), 4);
        assert_eq!(store.list_range("l", 0, 1).await.unwrap(), vec!["a", "b"]);
        assert_eq!(store.list_range("l", -2, -1).await.unwrap(), vec!["c", "d"]);
        assert!(store.list_range("l", 2, 1).await.unwrap().is_empty());
    }
}
