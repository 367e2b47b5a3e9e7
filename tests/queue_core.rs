//! Black-box scenarios against the crate's public surface, exercised
//! against `InMemoryStore`. Mirrors the concrete numbered scenarios of
//! spec.md §8.

use jobqueue_core::config::QueueConfig;
use jobqueue_core::job::{JobOptions, JobStatus};
use jobqueue_core::queue::{dequeue_any, get_failed_queue, release_job};
use jobqueue_core::store::InMemoryStore;
use jobqueue_core::{Queue, Store};
use std::sync::Arc;

fn store() -> Arc<dyn Store> {
    Arc::new(InMemoryStore::new())
}

#[tokio::test]
async fn scenario_basic_enqueue_dequeue() {
    let store = store();
    let queue = Queue::new(store, QueueConfig::new("default"));

    let job = queue
        .enqueue(br#"say_hello("Nick", foo="bar")"#.to_vec(), JobOptions::default())
        .await
        .unwrap();
    assert_eq!(queue.count().await.unwrap(), 1);

    let dequeued = queue.dequeue().await.unwrap().unwrap();
    assert_eq!(dequeued.id, job.id);
    assert_eq!(dequeued.origin, "default");
    assert_eq!(queue.count().await.unwrap(), 0);
}

#[tokio::test]
async fn scenario_multi_queue_priority() {
    let store = store();
    let foo = Queue::new(store.clone(), QueueConfig::new("foo"));
    let bar = Queue::new(store.clone(), QueueConfig::new("bar"));

    let bar_job = bar
        .enqueue(b"say_hello(\"for Bar\")".to_vec(), JobOptions::default())
        .await
        .unwrap();
    let foo_job = foo
        .enqueue(b"say_hello(\"for Foo\")".to_vec(), JobOptions::default())
        .await
        .unwrap();

    let first = dequeue_any(&[foo.clone(), bar.clone()], None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.job.id, foo_job.id);
    assert_eq!(first.queue.name(), "foo");

    let second = dequeue_any(&[foo, bar], None).await.unwrap().unwrap();
    assert_eq!(second.job.id, bar_job.id);
}

#[tokio::test]
async fn scenario_dependency_gating_with_mixed_parents() {
    let store = store();
    let queue = Queue::new(store.clone(), QueueConfig::new("default"));

    let parents_queue = Queue::new(store.clone(), QueueConfig::new("parents"));
    let p1 = parents_queue
        .enqueue(b"p1".to_vec(), JobOptions::default())
        .await
        .unwrap();
    let mut p2 = parents_queue
        .enqueue(b"p2".to_vec(), JobOptions::default())
        .await
        .unwrap();
    let p3 = parents_queue
        .enqueue(b"p3".to_vec(), JobOptions::default())
        .await
        .unwrap();
    // p2 finishes immediately; p1 and p3 stay CREATED (not STARTED, but any
    // non-FINISHED status demonstrates the gate).
    p2.status = JobStatus::Finished;
    p2.save(store.as_ref()).await.unwrap();

    let options = JobOptions {
        depends_on: vec![p1.id.clone(), p2.id.clone(), p3.id.clone()],
        ..Default::default()
    };
    let child = queue
        .enqueue(b"say_hello".to_vec(), options)
        .await
        .unwrap();
    assert_eq!(queue.count().await.unwrap(), 0);
    assert_eq!(child.status, JobStatus::Created);

    // Transition p1 and p3 to FINISHED, then drain each parent's
    // dependents set.
    let mut p1 = jobqueue_core::Job::fetch(store.as_ref(), &p1.id)
        .await
        .unwrap()
        .unwrap();
    p1.status = JobStatus::Finished;
    p1.save(store.as_ref()).await.unwrap();
    let mut p3 = jobqueue_core::Job::fetch(store.as_ref(), &p3.id)
        .await
        .unwrap()
        .unwrap();
    p3.status = JobStatus::Finished;
    p3.save(store.as_ref()).await.unwrap();

    jobqueue_core::queue::dependency::enqueue_dependents(&store, &p1)
        .await
        .unwrap();
    jobqueue_core::queue::dependency::enqueue_dependents(&store, &p3)
        .await
        .unwrap();

    assert_eq!(queue.count().await.unwrap(), 1);
}

#[tokio::test]
async fn scenario_deferred_release_to_alternate_queue() {
    let store = store();
    let q1 = Queue::new(store.clone(), QueueConfig::new("q1"));
    let q2 = Queue::new(store.clone(), QueueConfig::new("q2"));

    let options = JobOptions {
        deferred: true,
        ..Default::default()
    };
    let job = q1.enqueue(b"say_hello".to_vec(), options).await.unwrap();
    assert_eq!(job.status, JobStatus::Deferred);

    let released = release_job(store.clone(), &job.id, Some(q2.clone()))
        .await
        .unwrap();
    assert_eq!(released.status, JobStatus::Queued);
    assert!(q2.job_ids(0, -1).await.unwrap().contains(&job.id));
    assert!(!q1.job_ids(0, -1).await.unwrap().contains(&job.id));
}

#[tokio::test]
async fn scenario_compact_removes_stale_entries_preserving_order() {
    let store = store();
    let queue = Queue::new(store.clone(), QueueConfig::new("default"));

    let alice = queue
        .enqueue(b"say_hello(\"Alice\")".to_vec(), JobOptions::default())
        .await
        .unwrap();
    queue.push_job_id("1").await.unwrap();
    let charlie = queue
        .enqueue(b"say_hello(\"Charlie\")".to_vec(), JobOptions::default())
        .await
        .unwrap();
    queue.push_job_id("2").await.unwrap();

    assert_eq!(queue.count().await.unwrap(), 4);
    queue.compact().await.unwrap();
    assert_eq!(queue.count().await.unwrap(), 2);
    assert_eq!(
        queue.job_ids(0, -1).await.unwrap(),
        vec![alice.id, charlie.id]
    );
}

#[tokio::test]
async fn scenario_failure_round_trip_preserves_timeout_and_origin() {
    let store = store();
    let fake_queue = Queue::new(store.clone(), QueueConfig::new("fake"));
    let mut job = fake_queue
        .enqueue(b"say_hello".to_vec(), JobOptions::default())
        .await
        .unwrap();
    job.timeout = Some(200);
    job.save(store.as_ref()).await.unwrap();

    let failed_queue = get_failed_queue(store.clone());
    failed_queue.quarantine(&mut job, "Some error").await.unwrap();
    assert_eq!(failed_queue.count().await.unwrap(), 1);

    let requeued = failed_queue.requeue(&job.id).await.unwrap().unwrap();
    assert_eq!(failed_queue.count().await.unwrap(), 0);
    assert_eq!(fake_queue.count().await.unwrap(), 1);
    assert_eq!(requeued.timeout, Some(200));
    assert_eq!(requeued.status, JobStatus::Queued);
    assert!(requeued.exc_info.is_none());
}
