//! Store abstraction — the narrow interface over the external key/value
//! store (spec.md §6).
//!
//! `Store` exposes exactly the primitives the core needs: list push/pop/
//! range/remove/rename/delete, set add/remove/cardinality/members/pop,
//! sorted-set add/remove/range-by-score, hash get/set/delete, existence
//! checks, a priority-ordered blocking multi-key pop, and one watch/
//! transaction primitive shaped around the dependency-registration
//! algorithm of spec.md §4.3 (the only place the core needs multi-key
//! atomicity).
//!
//! Two backends are provided: [`redis_store::RedisStore`] for production,
//! and [`memory_store::InMemoryStore`] for tests and local development.

pub mod memory_store;
pub mod redis_store;

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;

pub use memory_store::InMemoryStore;
pub use redis_store::RedisStore;

/// Key namespace prefixes, stable across implementations for interop
/// (spec.md §6).
pub mod keys {
    pub const QUEUE_PREFIX: &str = "q:queue:";
    pub const WIP_QUEUE_PREFIX: &str = "q:wipqueue:";
    pub const DONE_QUEUE_PREFIX: &str = "q:donequeue:";
    pub const QUEUES_SET: &str = "q:queues";
    pub const DONE_QUEUES_SET: &str = "q:donequeues";
    pub const DEFERRED_SET: &str = "q:deferred";

    pub fn job_key(id: &str) -> String {
        format!("q:job:{}", id)
    }

    pub fn dependents_key(id: &str) -> String {
        format!("q:job:{}:dependents", id)
    }

    pub fn queue_key(name: &str) -> String {
        format!("{}{}", QUEUE_PREFIX, name)
    }

    pub fn wip_queue_key(name: &str) -> String {
        format!("{}{}", WIP_QUEUE_PREFIX, name)
    }

    pub fn done_queue_key(name: &str) -> String {
        format!("{}{}", DONE_QUEUE_PREFIX, name)
    }
}

/// Outcome of the dependency-registration watch/transaction (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyCheck {
    /// The parent's status field already read as the "finished" sentinel;
    /// nothing was mutated.
    ParentFinished,
    /// The parent was not yet finished; the child ID was atomically added
    /// to the parent's dependents set.
    Registered,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    // ---- list primitives ----
    async fn list_rpush(&self, key: &str, value: &str) -> StoreResult<()>;
    async fn list_lpop(&self, key: &str) -> StoreResult<Option<String>>;
    async fn list_len(&self, key: &str) -> StoreResult<i64>;
    async fn list_range(&self, key: &str, start: i64, stop: i64) -> StoreResult<Vec<String>>;
    /// Removes every occurrence of `value` from the list (Store `LREM`
    /// count-0 semantics). Returns the number removed.
    async fn list_remove_all(&self, key: &str, value: &str) -> StoreResult<i64>;
    async fn rename(&self, from: &str, to: &str) -> StoreResult<()>;
    async fn delete(&self, key: &str) -> StoreResult<()>;
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    // ---- set primitives ----
    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()>;
    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<i64>;
    async fn set_card(&self, key: &str) -> StoreResult<i64>;
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;
    async fn set_pop(&self, key: &str) -> StoreResult<Option<String>>;

    // ---- sorted-set primitives ----
    async fn zset_add(&self, key: &str, member: &str, score: f64) -> StoreResult<()>;
    async fn zset_remove(&self, key: &str, member: &str) -> StoreResult<i64>;
    async fn zset_range_by_score(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>>;

    // ---- hash primitives (a Job Record is one hash) ----
    async fn hash_set_all(&self, key: &str, fields: Vec<(String, String)>) -> StoreResult<()>;
    async fn hash_get_all(&self, key: &str) -> StoreResult<Option<HashMap<String, String>>>;

    /// Priority-ordered multi-key blocking pop. `timeout_secs == None` is
    /// non-blocking: the keys are probed in order and the first hit wins.
    /// `Some(0)` is rejected by callers before this is reached (spec.md
    /// §4.7); a backend may still treat it as "no timeout" defensively.
    async fn blocking_lpop(
        &self,
        keys: &[String],
        timeout_secs: Option<u64>,
    ) -> StoreResult<Option<(String, String)>>;

    /// The one multi-key-atomicity primitive the core needs: watch
    /// `parent_job_key`'s `status_field`; if it already equals
    /// `finished_value`, return `ParentFinished` without mutating anything.
    /// Otherwise, atomically add `child_id` to `dependents_key` and return
    /// `Registered`. Retries internally on concurrent modification of the
    /// watched key, up to [`crate::config::MAX_WATCH_ATTEMPTS`], then
    /// surfaces `StoreError::WatchContentionExhausted`.
    async fn watch_status_and_register(
        &self,
        parent_job_key: &str,
        status_field: &str,
        finished_value: &str,
        dependents_key: &str,
        child_id: &str,
    ) -> StoreResult<DependencyCheck>;
}
