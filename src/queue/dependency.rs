//! Dependency & Deferral Protocol (spec.md §4.3) — decides, atomically,
//! whether a newly created job enters its queue immediately, is parked on a
//! parent job's reverse-dependency set, or is parked as "deferred" pending
//! an explicit release call.
//!
//! This is the hardest piece of the core: it resolves the race between "a
//! parent just finished" and "a child is being registered as its dependent"
//! using the Store's one watch/transaction primitive,
//! [`Store::watch_status_and_register`].

use crate::config::QueueConfig;
use crate::error::CoreError;
use crate::job::{Job, JobOptions, JobStatus};
use crate::queue::Queue;
use crate::store::{keys, DependencyCheck, Store};
use std::sync::Arc;

const FINISHED: &str = "finished";

/// Path A/B/C of the protocol. Builds the Job Record, then either parks it
/// on the first unfinished parent found, defers it, or enqueues it — always
/// returning the Job regardless of where it ended up.
pub async fn enqueue_call(
    queue: &Queue,
    payload: Vec<u8>,
    options: JobOptions,
) -> Result<Job, CoreError> {
    let dependencies = options.resolved_dependencies();
    let deferred_requested = options.deferred || !options.blocked_by.is_empty();

    let init_status = if deferred_requested {
        JobStatus::Deferred
    } else if !dependencies.is_empty() {
        // The source leaves this QUEUED — its own TODO flags that as wrong.
        // Created marks the job as gated without claiming readiness (spec.md
        // §3 invariant, §9 Open Questions).
        JobStatus::Created
    } else {
        JobStatus::Queued
    };

    let mut job = Job::new(payload, &options, init_status);

    for parent_id in &dependencies {
        let outcome = queue
            .store()
            .watch_status_and_register(
                &keys::job_key(parent_id),
                "status",
                FINISHED,
                &keys::dependents_key(parent_id),
                &job.id,
            )
            .await?;
        match outcome {
            DependencyCheck::Registered => {
                // Parked on this parent; stop scanning (spec.md §4.3 edge
                // case: registering on the first unfinished parent found is
                // sufficient).
                job.dependencies = dependencies;
                job.save(queue.store().as_ref()).await?;
                return Ok(job);
            }
            DependencyCheck::ParentFinished => continue,
        }
    }

    // All parents (if any) are finished.
    if init_status == JobStatus::Deferred {
        defer_job(queue, &mut job).await?;
    } else {
        queue.enqueue_job(&mut job, true).await?;
    }
    Ok(job)
}

/// Path C: adds the job to the Deferred Set and records its
/// origin/timeout/enqueued_at without putting it on any FIFO list.
async fn defer_job(queue: &Queue, job: &mut Job) -> Result<(), CoreError> {
    job.status = JobStatus::Deferred;
    job.origin = queue.name().to_string();
    job.enqueued_at = Some(chrono::Utc::now());
    if job.timeout.is_none() {
        job.timeout = Some(queue.default_timeout());
    }
    job.save(queue.store().as_ref()).await?;
    queue.store().set_add(keys::DEFERRED_SET, &job.id).await?;
    Ok(())
}

/// The external entry point for releasing a deferred job (spec.md §4.3).
///
/// Resolves `job_id`, requires status `DEFERRED`, removes it from the
/// Deferred Set (failing `NoSuchJob` if it wasn't there), transitions it to
/// `QUEUED`, and enqueues it into `target_queue` (or a queue named by the
/// job's own `origin` if none is supplied).
///
/// This only makes the released job runnable — it does NOT promote that
/// job's own dependents. A dependent is only unblocked once the job it
/// depends on is actually `FINISHED` (spec.md §3 Invariant 2), and releasing
/// a deferred job merely makes it `QUEUED`, i.e. eligible to run. Whatever
/// marks a job `FINISHED` is responsible for draining its dependents via
/// [`enqueue_dependents`] at that point.
pub async fn release_job(
    store: Arc<dyn Store>,
    job_id: &str,
    target_queue: Option<Queue>,
) -> Result<Job, CoreError> {
    let mut job = Job::fetch(store.as_ref(), job_id)
        .await?
        .ok_or_else(|| CoreError::NoSuchJob {
            job_id: job_id.to_string(),
            context: "release_job".to_string(),
        })?;

    if !job.is_deferred() {
        return Err(CoreError::InvalidJobOperation {
            job_id: job_id.to_string(),
            reason: format!(
                "job status is {:?} and not 'deferred'",
                job.status
            ),
        });
    }

    let target = target_queue
        .unwrap_or_else(|| Queue::new(store.clone(), QueueConfig::new(job.origin.clone())));

    let removed = store.set_remove(keys::DEFERRED_SET, job_id).await?;
    if removed == 0 {
        return Err(CoreError::NoSuchJob {
            job_id: job_id.to_string(),
            context: "no such blocked job".to_string(),
        });
    }

    job.status = JobStatus::Queued;
    target.enqueue_job(&mut job, true).await?;

    Ok(job)
}

/// Drains `parent.dependents_key()`, promoting children whose OTHER parents
/// are all `FINISHED`. A child whose other parents are still pending is
/// re-registered against the first of those so it's not lost (spec.md §9
/// Open Question 2: a correct implementation must verify the full parent
/// set, not just the one parent that happened to complete first).
pub async fn enqueue_dependents(store: &Arc<dyn Store>, parent: &Job) -> Result<(), CoreError> {
    loop {
        let Some(child_id) = store.set_pop(&parent.dependents_key()).await? else {
            break;
        };
        let Some(mut child) = Job::fetch(store.as_ref(), &child_id).await? else {
            continue;
        };

        let mut pending_parent = None;
        for other_id in &child.dependencies {
            if other_id == &parent.id {
                continue;
            }
            match Job::fetch(store.as_ref(), other_id).await? {
                Some(other) if other.status != JobStatus::Finished => {
                    pending_parent = Some(other_id.clone());
                    break;
                }
                _ => {}
            }
        }

        match pending_parent {
            None => {
                child.status = JobStatus::Queued;
                let origin = Queue::new(store.clone(), QueueConfig::new(child.origin.clone()));
                origin.enqueue_job(&mut child, true).await?;
            }
            Some(other_parent_id) => {
                store
                    .set_add(&keys::dependents_key(&other_parent_id), &child.id)
                    .await?;
                child.save(store.as_ref()).await?;
            }
        }
    }
    Ok(())
}
