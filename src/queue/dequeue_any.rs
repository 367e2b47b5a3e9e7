//! Multi-Queue Blocking Dequeue (spec.md §4.7) — lets a consumer wait on a
//! priority-ordered list of queues with a bounded timeout.

use crate::error::CoreError;
use crate::job::Job;
use crate::queue::Queue;

/// The job plus the queue that actually served it, so the consumer knows
/// which queue won.
#[derive(Debug)]
pub struct DequeueOutcome {
    pub job: Job,
    pub queue: Queue,
}

/// `timeout`:
/// - `None`: non-blocking; probes queues in the supplied order, returning
///   the first hit.
/// - `Some(0)`: rejected — indefinite blocking is disallowed.
/// - `Some(n)`, `n > 0`: blocks up to `n` seconds across all queues,
///   honoring priority = list order.
///
/// A popped ID with no backing Job Record is silently dropped and the loop
/// continues with the same timeout (the source re-invokes with the
/// original timeout rather than a shrinking one; this implementation
/// matches that and iterates rather than recursing, spec.md §9 Open
/// Question 4).
pub async fn dequeue_any(
    queues: &[Queue],
    timeout: Option<u64>,
) -> Result<Option<DequeueOutcome>, CoreError> {
    if timeout == Some(0) {
        return Err(CoreError::ValueError(
            "dequeue_any does not support an indefinite timeout (0); pick a value > 0".to_string(),
        ));
    }

    let Some(store) = queues.first().map(|q| q.store().clone()) else {
        return match timeout {
            None => Ok(None),
            Some(t) => Err(CoreError::DequeueTimeout {
                timeout_secs: t,
                queue_keys: Vec::new(),
            }),
        };
    };
    let queue_keys: Vec<String> = queues.iter().map(Queue::key).collect();

    loop {
        let popped = store.blocking_lpop(&queue_keys, timeout).await?;
        let Some((key, job_id)) = popped else {
            return match timeout {
                None => Ok(None),
                Some(t) => Err(CoreError::DequeueTimeout {
                    timeout_secs: t,
                    queue_keys,
                }),
            };
        };

        match Job::fetch(store.as_ref(), &job_id).await? {
            Some(job) => {
                let queue = queues
                    .iter()
                    .find(|q| q.key() == key)
                    .cloned()
                    .expect("popped key must belong to one of the supplied queues");
                return Ok(Some(DequeueOutcome { job, queue }));
            }
            None => continue,
        }
    }
}
