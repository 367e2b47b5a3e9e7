//! WIP (Work-in-Progress) Queue — a companion sorted set per parent Queue
//! tracking jobs claimed by a worker but not yet completed (spec.md §4.4).
//!
//! The score convention is `now + job.timeout`, the wall-clock deadline at
//! which a claim expires. A crashed worker's claim doesn't strand the job:
//! [`WipQueue::remove_expired_jobs`] gives a recovery routine the expired
//! IDs back so they can be re-dispatched.

use crate::error::CoreError;
use crate::store::{keys, Store};
use chrono::Utc;
use std::sync::Arc;

pub struct WipQueue {
    store: Arc<dyn Store>,
    parent_name: String,
}

impl WipQueue {
    pub fn new(store: Arc<dyn Store>, parent_name: impl Into<String>) -> Self {
        Self {
            store,
            parent_name: parent_name.into(),
        }
    }

    pub fn key(&self) -> String {
        keys::wip_queue_key(&self.parent_name)
    }

    /// Claims `job_id` with a deadline of `now + timeout_secs`.
    pub async fn add_job(&self, job_id: &str, timeout_secs: u64) -> Result<(), CoreError> {
        let deadline = Utc::now().timestamp() as f64 + timeout_secs as f64;
        self.store.zset_add(&self.key(), job_id, deadline).await?;
        Ok(())
    }

    pub async fn remove_job(&self, job_id: &str) -> Result<(), CoreError> {
        self.store.zset_remove(&self.key(), job_id).await?;
        Ok(())
    }

    /// Deletes and returns every entry whose deadline has passed.
    pub async fn remove_expired_jobs(&self) -> Result<Vec<String>, CoreError> {
        let now = Utc::now().timestamp() as f64;
        let expired = self
            .store
            .zset_range_by_score(&self.key(), f64::MIN, now)
            .await?;
        for id in &expired {
            self.store.zset_remove(&self.key(), id).await?;
        }
        Ok(expired)
    }
}
