//! Queue — a named, durable FIFO list of job IDs plus the metadata and
//! companion structures that govern their lifecycle (spec.md §4.1).

pub mod dependency;
pub mod dequeue_any;
pub mod done;
pub mod failed;
pub mod wip;

pub use dependency::release_job;
pub use dequeue_any::{dequeue_any, DequeueOutcome};
pub use done::DoneQueue;
pub use failed::{get_failed_queue, FailedQueue, FAILED_QUEUE_NAME};
pub use wip::WipQueue;

use crate::config::QueueConfig;
use crate::error::CoreError;
use crate::job::{Job, JobOptions, JobStatus};
use crate::store::{keys, Store};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use uuid::Uuid;

/// Hook for the external worker collaborator invoked synchronously when a
/// queue's `async_mode` is `false` (spec.md §4.1, §9 Design Notes). The core
/// never interprets a job's payload itself — this is the seam where that
/// interpretation is plugged in.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &mut Job) -> Result<(), CoreError>;
}

/// A named FIFO list of job IDs, plus its companion WIP and Done queues.
///
/// Equality, ordering, and hashing are by `name` alone (spec.md §3, §4.1),
/// matching the source's `@total_ordering` on queue name.
#[derive(Clone)]
pub struct Queue {
    store: Arc<dyn Store>,
    name: String,
    default_timeout: u64,
    async_mode: bool,
    executor: Option<Arc<dyn JobExecutor>>,
}

impl Queue {
    pub fn new(store: Arc<dyn Store>, config: QueueConfig) -> Self {
        Self {
            store,
            name: config.name,
            default_timeout: config.default_timeout,
            async_mode: config.async_mode,
            executor: None,
        }
    }

    /// Attaches the synchronous executor used when `async_mode` is `false`.
    pub fn with_executor(mut self, executor: Arc<dyn JobExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_timeout(&self) -> u64 {
        self.default_timeout
    }

    pub fn async_mode(&self) -> bool {
        self.async_mode
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub fn key(&self) -> String {
        keys::queue_key(&self.name)
    }

    pub fn wip_queue(&self) -> WipQueue {
        WipQueue::new(self.store.clone(), self.name.clone())
    }

    pub fn done_queue(&self) -> DoneQueue {
        DoneQueue::new(self.store.clone(), self.name.clone())
    }

    /// Creates a Job Record from `payload`/`options` and runs it through the
    /// Dependency & Deferral Protocol (spec.md §4.1, §4.3), returning the
    /// Job regardless of whether it reached the FIFO list, was parked on a
    /// parent, or was deferred.
    pub async fn enqueue(&self, payload: Vec<u8>, options: JobOptions) -> Result<Job, CoreError> {
        dependency::enqueue_call(self, payload, options).await
    }

    /// Low-level insert (spec.md §4.1 `enqueue_job`). Registers the queue
    /// name in the Queue Registry, stamps `origin`/`enqueued_at` unless
    /// `set_meta_data` is false (the quarantine path), applies the queue's
    /// default timeout, persists the job, then either appends its ID to the
    /// FIFO list (`async_mode == true`) or runs it inline through the
    /// configured `JobExecutor`.
    pub async fn enqueue_job(&self, job: &mut Job, set_meta_data: bool) -> Result<(), CoreError> {
        self.store.set_add(keys::QUEUES_SET, &self.key()).await?;

        if set_meta_data {
            job.origin = self.name.clone();
            job.enqueued_at = Some(chrono::Utc::now());
        }
        if job.timeout.is_none() {
            job.timeout = Some(self.default_timeout);
        }
        job.save(self.store.as_ref()).await?;

        if self.async_mode {
            self.push_job_id(&job.id).await?;
        } else {
            let executor = self.executor.as_ref().ok_or_else(|| {
                CoreError::ValueError(format!(
                    "queue '{}' has async_mode=false but no JobExecutor configured",
                    self.name
                ))
            })?;
            executor.execute(job).await?;
            job.save(self.store.as_ref()).await?;
        }
        Ok(())
    }

    /// Pops the head job ID and loads its record, iterating past stale IDs
    /// with no backing record rather than recursing (spec.md §9 Open
    /// Question 4).
    pub async fn dequeue(&self) -> Result<Option<Job>, CoreError> {
        loop {
            let Some(job_id) = self.pop_job_id().await? else {
                return Ok(None);
            };
            if let Some(job) = Job::fetch(self.store.as_ref(), &job_id).await? {
                return Ok(Some(job));
            }
        }
    }

    /// Removes every occurrence of `job_id` from the FIFO list.
    pub async fn remove(&self, job_id: &str) -> Result<i64, CoreError> {
        Ok(self.store.list_remove_all(&self.key(), job_id).await?)
    }

    /// Deletes the FIFO list, then cancels every job that was on it. The
    /// list is deleted first so producers observe an empty queue promptly;
    /// the per-job cascade is best-effort (spec.md §4.1).
    pub async fn empty(&self) -> Result<(), CoreError> {
        let ids = self.store.list_range(&self.key(), 0, -1).await?;
        self.store.delete(&self.key()).await?;
        for id in ids {
            if let Some(job) = Job::fetch(self.store.as_ref(), &id).await? {
                job.cancel(self.store.as_ref()).await?;
            }
        }
        Ok(())
    }

    /// Removes FIFO entries with no backing Job Record while preserving the
    /// relative order of survivors: rename the list to a scratch key, then
    /// drain it head-first, re-appending only extant IDs (spec.md §4.1).
    pub async fn compact(&self) -> Result<(), CoreError> {
        let scratch = format!("{}_compact:{}", self.key(), Uuid::new_v4());
        self.store.rename(&self.key(), &scratch).await?;
        loop {
            let Some(id) = self.store.list_lpop(&scratch).await? else {
                break;
            };
            if Job::exists(self.store.as_ref(), &id).await? {
                self.store.list_rpush(&self.key(), &id).await?;
            }
        }
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, CoreError> {
        Ok(self.store.list_len(&self.key()).await?)
    }

    pub async fn is_empty(&self) -> Result<bool, CoreError> {
        Ok(self.count().await? == 0)
    }

    /// Returns a slice of job IDs. `length < 0` means "through the end",
    /// matching the Store's negative-index range semantics.
    pub async fn job_ids(&self, offset: i64, length: i64) -> Result<Vec<String>, CoreError> {
        let stop = if length >= 0 { offset + length - 1 } else { length };
        Ok(self.store.list_range(&self.key(), offset, stop).await?)
    }

    /// Loads the jobs named by `job_ids(offset, length)`. Entries whose
    /// record is gone are silently dropped from the result AND removed from
    /// the FIFO list as a side effect (self-healing read, spec.md §4.1).
    pub async fn jobs(&self, offset: i64, length: i64) -> Result<Vec<Job>, CoreError> {
        let ids = self.job_ids(offset, length).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            match Job::fetch(self.store.as_ref(), &id).await? {
                Some(job) => out.push(job),
                None => {
                    self.remove(&id).await?;
                }
            }
        }
        Ok(out)
    }

    pub async fn pop_job_id(&self) -> Result<Option<String>, CoreError> {
        Ok(self.store.list_lpop(&self.key()).await?)
    }

    pub async fn push_job_id(&self, job_id: &str) -> Result<(), CoreError> {
        self.store.list_rpush(&self.key(), job_id).await?;
        Ok(())
    }

    /// Releases a job that was deferred into *this* queue, i.e. changes the
    /// job's originally-declared queue. Use the free function
    /// [`release_job`] to release into the job's existing `origin` instead.
    pub async fn release_job_here(&self, job_id: &str) -> Result<Job, CoreError> {
        dependency::release_job(self.store.clone(), job_id, Some(self.clone())).await
    }

    /// All queues the core has ever seen an enqueue for (spec.md §3, Queue
    /// Registry — entries are never removed by the core).
    pub async fn all_queues(store: Arc<dyn Store>) -> Result<Vec<Queue>, CoreError> {
        let queue_keys = store.set_members(keys::QUEUES_SET).await?;
        let mut queues = Vec::with_capacity(queue_keys.len());
        for key in queue_keys {
            queues.push(Self::from_queue_key(store.clone(), &key)?);
        }
        Ok(queues)
    }

    /// Reverse-lookup a `Queue` from its Store key, stripping the queue
    /// prefix. Fails with `ValueError` if `key` doesn't carry the prefix.
    pub fn from_queue_key(store: Arc<dyn Store>, key: &str) -> Result<Queue, CoreError> {
        let name = key.strip_prefix(keys::QUEUE_PREFIX).ok_or_else(|| {
            CoreError::ValueError(format!("not a valid queue key: {}", key))
        })?;
        Ok(Queue::new(store, QueueConfig::new(name)))
    }
}

impl PartialEq for Queue {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Queue {}

impl PartialOrd for Queue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Queue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl Hash for Queue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("default_timeout", &self.default_timeout)
            .field("async_mode", &self.async_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobOptions;
    use crate::store::InMemoryStore;

    fn queue(store: Arc<dyn Store>, name: &str) -> Queue {
        Queue::new(store, QueueConfig::new(name))
    }

    #[tokio::test]
    async fn enqueue_job_sets_meta_data_and_pushes_id() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let q = queue(store.clone(), "default");
        let mut job = Job::new(b"p".to_vec(), &JobOptions::default(), JobStatus::Queued);
        q.enqueue_job(&mut job, true).await.unwrap();

        assert_eq!(q.count().await.unwrap(), 1);
        assert_eq!(job.origin, "default");
        assert!(job.enqueued_at.is_some());
        assert_eq!(job.timeout, Some(crate::config::DEFAULT_QUEUE_TIMEOUT_SECS));
    }

    #[tokio::test]
    async fn dequeue_skips_stale_ids_iteratively() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let q = queue(store.clone(), "default");
        q.push_job_id("stale-1").await.unwrap();
        q.push_job_id("stale-2").await.unwrap();
        let mut job = Job::new(b"p".to_vec(), &JobOptions::default(), JobStatus::Queued);
        job.save(store.as_ref()).await.unwrap();
        q.push_job_id(&job.id).await.unwrap();

        let dequeued = q.dequeue().await.unwrap().unwrap();
        assert_eq!(dequeued.id, job.id);
        assert_eq!(q.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn compact_preserves_order_and_drops_stale_ids() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let q = queue(store.clone(), "default");
        let mut alice = Job::new(b"alice".to_vec(), &JobOptions::default(), JobStatus::Queued);
        let mut charlie = Job::new(b"charlie".to_vec(), &JobOptions::default(), JobStatus::Queued);
        q.enqueue_job(&mut alice, true).await.unwrap();
        q.push_job_id("1").await.unwrap();
        q.enqueue_job(&mut charlie, true).await.unwrap();
        q.push_job_id("2").await.unwrap();

        assert_eq!(q.count().await.unwrap(), 4);
        q.compact().await.unwrap();
        assert_eq!(q.count().await.unwrap(), 2);
        assert_eq!(q.job_ids(0, -1).await.unwrap(), vec![alice.id.clone(), charlie.id.clone()]);
    }

    #[tokio::test]
    async fn remove_drops_all_occurrences() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let q = queue(store.clone(), "default");
        q.push_job_id("x").await.unwrap();
        q.push_job_id("y").await.unwrap();
        q.push_job_id("x").await.unwrap();
        let removed = q.remove("x").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(q.count().await.unwrap(), 1);
    }

    #[test]
    fn queues_are_equal_and_ordered_by_name_only() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let a = queue(store.clone(), "alpha");
        let b = queue(store.clone(), "beta");
        let a2 = queue(store.clone(), "alpha");
        assert_eq!(a, a2);
        assert!(a < b);
    }

    #[test]
    fn from_queue_key_round_trips_with_queue_key() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let q = Queue::from_queue_key(store, &keys::queue_key("default")).unwrap();
        assert_eq!(q.name(), "default");
    }

    #[test]
    fn from_queue_key_rejects_foreign_prefix() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        assert!(Queue::from_queue_key(store, "not:a:queue:key").is_err());
    }
}
