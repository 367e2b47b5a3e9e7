//! Job queue core — durable queues, jobs, dependency gating, and WIP
//! accounting backed by a shared key/value Store.
//!
//! This crate is the core of a distributed job queue. It does not execute
//! job payloads, serialize callables, or provide a Store client itself —
//! those are external collaborators. See each module for its slice of the
//! system.

pub mod config;
pub mod error;
pub mod job;
pub mod queue;
pub mod store;

pub use error::CoreError;
pub use job::{Job, JobOptions, JobStatus};
pub use queue::{dequeue_any, release_job, DequeueOutcome, FailedQueue, Queue};
pub use store::Store;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn basic_enqueue_dequeue_round_trip() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let queue = Queue::new(store, QueueConfig::new("default"));

        let job = queue
            .enqueue(
                br#"say_hello("Nick", foo="bar")"#.to_vec(),
                JobOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(queue.count().await.unwrap(), 1);
        assert_eq!(job.origin, "default");

        let dequeued = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(dequeued.id, job.id);
        assert_eq!(queue.count().await.unwrap(), 0);
    }
}
