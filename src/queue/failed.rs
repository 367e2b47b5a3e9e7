//! Failed Queue — the singleton quarantine queue (spec.md §4.6).
//!
//! Implemented as an explicit wrapper type rather than relying on string
//! collision with a plain `Queue` named `"failed"` (spec.md §9 Design
//! Notes: "implementers should make this explicit").

use crate::config::QueueConfig;
use crate::error::CoreError;
use crate::job::{Job, JobStatus};
use crate::queue::Queue;
use crate::store::Store;
use std::ops::Deref;
use std::sync::Arc;

/// Sentinel queue name — the string form of `JobStatus::Failed`.
pub const FAILED_QUEUE_NAME: &str = "failed";

/// A specialized `Queue` for quarantined jobs. Derefs to `Queue` so the full
/// read/enumeration surface (`count`, `job_ids`, `jobs`, ...) is available
/// without re-exposing `enqueue`/`enqueue_job`/`dequeue`, which quarantine
/// and requeue bypass on purpose.
pub struct FailedQueue(Queue);

impl FailedQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self(Queue::new(store, QueueConfig::new(FAILED_QUEUE_NAME)))
    }

    /// Moves `job` into the failed queue, preserving its `origin` and
    /// `enqueued_at` (so they continue to identify the job's home queue)
    /// by enqueueing with `set_meta_data = false`.
    pub async fn quarantine(
        &self,
        job: &mut Job,
        exc_info: impl Into<String>,
    ) -> Result<(), CoreError> {
        job.ended_at = Some(chrono::Utc::now());
        job.exc_info = Some(exc_info.into());
        job.status = JobStatus::Failed;
        self.0.enqueue_job(job, false).await
    }

    /// Loads `job_id` (silently no-ops if missing), removes it from the
    /// failed queue (fails `InvalidJobOperation` if it wasn't present —
    /// meaning the job was never quarantined), clears `exc_info`, sets
    /// status `QUEUED`, and enqueues into the queue named by `origin`.
    pub async fn requeue(&self, job_id: &str) -> Result<Option<Job>, CoreError> {
        let Some(mut job) = Job::fetch(self.0.store().as_ref(), job_id).await? else {
            return Ok(None);
        };

        let removed = self.0.remove(job_id).await?;
        if removed == 0 {
            return Err(CoreError::InvalidJobOperation {
                job_id: job_id.to_string(),
                reason: "job is not in the failed queue".to_string(),
            });
        }

        job.exc_info = None;
        job.status = JobStatus::Queued;
        let origin = Queue::new(self.0.store().clone(), QueueConfig::new(job.origin.clone()));
        origin.enqueue_job(&mut job, true).await?;
        Ok(Some(job))
    }
}

impl Deref for FailedQueue {
    type Target = Queue;
    fn deref(&self) -> &Queue {
        &self.0
    }
}

pub fn get_failed_queue(store: Arc<dyn Store>) -> FailedQueue {
    FailedQueue::new(store)
}
