//! In-memory Store backend for tests and local development.
//!
//! Mirrors the teacher's `InMemoryQueue` (`Arc<Mutex<QueueState>>`, no
//! external dependencies beyond stdlib + tokio) but implements the full
//! `Store` primitive surface rather than the higher-level `Queue` trait, so
//! the same `Queue`/dependency-protocol code that runs against `RedisStore`
//! runs against this backend in tests.

use crate::store::{DependencyCheck, Store, StoreResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Default)]
struct State {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
    hashes: HashMap<String, HashMap<String, String>>,
}

/// Thread-safe, in-process Store backend. Suitable for unit tests and
/// single-process development; offers no durability or cross-process
/// sharing.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn list_rpush(&self, key: &str, value: &str) -> StoreResult<()> {
        self.lock()
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    async fn list_lpop(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self
            .lock()
            .lists
            .get_mut(key)
            .and_then(|l| l.pop_front()))
    }

    async fn list_len(&self, key: &str) -> StoreResult<i64> {
        Ok(self.lock().lists.get(key).map(|l| l.len()).unwrap_or(0) as i64)
    }

    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>> {
        let state = self.lock();
        let list = match state.lists.get(key) {
            Some(l) => l,
            None => return Ok(Vec::new()),
        };
        let len = list.len() as i64;
        if len == 0 {
            return Ok(Vec::new());
        }
        let norm = |i: i64| -> i64 {
            if i < 0 {
                (len + i).max(0)
            } else {
                i.min(len - 1).max(0)
            }
        };
        let start_idx = norm(start);
        let stop_idx = if stop < 0 { len + stop } else { stop.min(len - 1) };
        if stop_idx < start_idx || start_idx >= len {
            return Ok(Vec::new());
        }
        Ok(list
            .iter()
            .skip(start_idx as usize)
            .take((stop_idx - start_idx + 1) as usize)
            .cloned()
            .collect())
    }

    async fn list_remove_all(&self, key: &str, value: &str) -> StoreResult<i64> {
        let mut state = self.lock();
        let list = match state.lists.get_mut(key) {
            Some(l) => l,
            None => return Ok(0),
        };
        let before = list.len();
        list.retain(|v| v != value);
        Ok((before - list.len()) as i64)
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let mut state = self.lock();
        if let Some(list) = state.lists.remove(from) {
            state.lists.insert(to.to_string(), list);
        } else {
            state.lists.insert(to.to_string(), VecDeque::new());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut state = self.lock();
        state.lists.remove(key);
        state.sets.remove(key);
        state.zsets.remove(key);
        state.hashes.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let state = self.lock();
        Ok(state.lists.contains_key(key)
            || state.sets.contains_key(key)
            || state.zsets.contains_key(key)
            || state.hashes.contains_key(key))
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()> {
        self.lock()
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<i64> {
        let mut state = self.lock();
        Ok(match state.sets.get_mut(key) {
            Some(s) if s.remove(member) => 1,
            _ => 0,
        })
    }

    async fn set_card(&self, key: &str) -> StoreResult<i64> {
        Ok(self.lock().sets.get(key).map(|s| s.len()).unwrap_or(0) as i64)
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .lock()
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_pop(&self, key: &str) -> StoreResult<Option<String>> {
        let mut state = self.lock();
        let member = state
            .sets
            .get(key)
            .and_then(|s| s.iter().next().cloned());
        if let Some(ref m) = member {
            state.sets.get_mut(key).unwrap().remove(m);
        }
        Ok(member)
    }

    async fn zset_add(&self, key: &str, member: &str, score: f64) -> StoreResult<()> {
        self.lock()
            .zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    async fn zset_remove(&self, key: &str, member: &str) -> StoreResult<i64> {
        let mut state = self.lock();
        Ok(match state.zsets.get_mut(key) {
            Some(z) if z.remove(member).is_some() => 1,
            _ => 0,
        })
    }

    async fn zset_range_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>> {
        let state = self.lock();
        let mut members: Vec<(String, f64)> = state
            .zsets
            .get(key)
            .map(|z| {
                z.iter()
                    .filter(|(_, &score)| score >= min && score <= max)
                    .map(|(m, s)| (m.clone(), *s))
                    .collect()
            })
            .unwrap_or_default();
        members.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
        Ok(members.into_iter().map(|(m, _)| m).collect())
    }

    async fn hash_set_all(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()> {
        let mut state = self.lock();
        let entry = state.hashes.entry(key.to_string()).or_default();
        for (f, v) in fields {
            entry.insert(f, v);
        }
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>> {
        Ok(self.lock().hashes.get(key).cloned())
    }

    async fn blocking_lpop(
        &self,
        keys: &[String],
        timeout_secs: Option<u64>,
    ) -> StoreResult<Option<(String, String)>> {
        let deadline = timeout_secs.map(|s| Instant::now() + Duration::from_secs(s));
        loop {
            {
                let mut state = self.lock();
                for key in keys {
                    if let Some(value) = state.lists.get_mut(key).and_then(|l| l.pop_front()) {
                        return Ok(Some((key.clone(), value)));
                    }
                }
            }
            match deadline {
                None => return Ok(None),
                Some(d) if Instant::now() >= d => return Ok(None),
                Some(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
    }

    async fn watch_status_and_register(
        &self,
        parent_job_key: &str,
        status_field: &str,
        finished_value: &str,
        dependents_key: &str,
        child_id: &str,
    ) -> StoreResult<DependencyCheck> {
        let mut state = self.lock();
        let status = state
            .hashes
            .get(parent_job_key)
            .and_then(|h| h.get(status_field))
            .cloned();
        if status.as_deref() == Some(finished_value) {
            return Ok(DependencyCheck::ParentFinished);
        }
        state
            .sets
            .entry(dependents_key.to_string())
            .or_default()
            .insert(child_id.to_string());
        Ok(DependencyCheck::Registered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_round_trip_is_fifo() {
        let store = InMemoryStore::new();
        store.list_rpush("k", "a").await.unwrap();
        store.list_rpush("k", "b").await.unwrap();
        assert_eq!(store.list_len("k").await.unwrap(), 2);
        assert_eq!(store.list_lpop("k").await.unwrap(), Some("a".to_string()));
        assert_eq!(store.list_lpop("k").await.unwrap(), Some("b".to_string()));
        assert_eq!(store.list_lpop("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn list_remove_all_removes_every_occurrence() {
        let store = InMemoryStore::new();
        for v in ["x", "y", "x", "z", "x"] {
            store.list_rpush("k", v).await.unwrap();
        }
        let removed = store.list_remove_all("k", "x").await.unwrap();
        assert_eq!(removed, 3);
        assert_eq!(
            store.list_range("k", 0, -1).await.unwrap(),
            vec!["y".to_string(), "z".to_string()]
        );
    }

    #[tokio::test]
    async fn watch_status_and_register_detects_finished_parent() {
        let store = InMemoryStore::new();
        store
            .hash_set_all("q:job:p1", vec![("status".to_string(), "finished".to_string())])
            .await
            .unwrap();
        let outcome = store
            .watch_status_and_register("q:job:p1", "status", "finished", "q:job:p1:dependents", "c1")
            .await
            .unwrap();
        assert_eq!(outcome, DependencyCheck::ParentFinished);
        assert_eq!(store.set_card("q:job:p1:dependents").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn watch_status_and_register_parks_child_on_unfinished_parent() {
        let store = InMemoryStore::new();
        store
            .hash_set_all("q:job:p1", vec![("status".to_string(), "created".to_string())])
            .await
            .unwrap();
        let outcome = store
            .watch_status_and_register("q:job:p1", "status", "finished", "q:job:p1:dependents", "c1")
            .await
            .unwrap();
        assert_eq!(outcome, DependencyCheck::Registered);
        assert_eq!(
            store.set_members("q:job:p1:dependents").await.unwrap(),
            vec!["c1".to_string()]
        );
    }

    #[tokio::test]
    async fn blocking_lpop_honors_priority_order() {
        let store = InMemoryStore::new();
        store.list_rpush("q:queue:bar", "b-job").await.unwrap();
        store.list_rpush("q:queue:foo", "f-job").await.unwrap();
        let result = store
            .blocking_lpop(
                &["q:queue:foo".to_string(), "q:queue:bar".to_string()],
                None,
            )
            .await
            .unwrap();
        assert_eq!(result, Some(("q:queue:foo".to_string(), "f-job".to_string())));
    }

    #[tokio::test]
    async fn blocking_lpop_non_blocking_returns_none_on_empty() {
        let store = InMemoryStore::new();
        let result = store.blocking_lpop(&[], None).await.unwrap();
        assert_eq!(result, None);
    }
}
