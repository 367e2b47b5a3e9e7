//! Done Queue — a companion sorted set per parent Queue recording
//! successfully completed job IDs, used for TTL-governed result retention
//! (spec.md §4.5).
//!
//! Shares its score convention with [`super::wip::WipQueue`]: the entry's
//! score is the wall-clock deadline after which the result may be garbage
//! collected.
//!
//! `requeue_job` is unimplemented in the source this core was ported from
//! and is flagged future work there (spec.md §9 Open Question 3); this core
//! omits it for the same reason.

use crate::error::CoreError;
use crate::store::{keys, Store};
use chrono::Utc;
use std::sync::Arc;

pub struct DoneQueue {
    store: Arc<dyn Store>,
    parent_name: String,
}

impl DoneQueue {
    pub fn new(store: Arc<dyn Store>, parent_name: impl Into<String>) -> Self {
        Self {
            store,
            parent_name: parent_name.into(),
        }
    }

    pub fn key(&self) -> String {
        keys::done_queue_key(&self.parent_name)
    }

    /// Records `job_id` as done, retained until `now + result_ttl_secs`, and
    /// registers this Done Queue's key in the done-queue registry.
    pub async fn add_job(&self, job_id: &str, result_ttl_secs: u64) -> Result<(), CoreError> {
        self.store
            .set_add(keys::DONE_QUEUES_SET, &self.key())
            .await?;
        let deadline = Utc::now().timestamp() as f64 + result_ttl_secs as f64;
        self.store.zset_add(&self.key(), job_id, deadline).await?;
        Ok(())
    }
}
