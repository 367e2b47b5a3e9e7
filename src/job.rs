//! Job Record — identity, status, payload reference, dependency edges,
//! origin queue, and timing metadata (spec.md §3, §4.2).
//!
//! A `Job` mediates all reads/writes of its fields through a [`Store`]; it
//! holds no reverse-dependency state itself (that lives under the parent's
//! dependents key — see [`crate::store::keys::dependents_key`]).

use crate::error::CoreError;
use crate::store::{keys, Store};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle states of a job (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    /// Exists, gating on one or more unfinished parents; not yet queued and
    /// not deferred. Entered only via Path B of the dependency protocol
    /// (spec.md §4.3) — the source leaves jobs like this `QUEUED`, which its
    /// own TODO flags as wrong; this status is the fix (spec.md §9 Open
    /// Questions, invariant in §3).
    Created,
    Queued,
    Started,
    Finished,
    Failed,
    Deferred,
}

impl JobStatus {
    /// The literal stored in the job hash's `status` field. Also doubles as
    /// the Failed Queue's sentinel name (spec.md §4.6).
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Started => "started",
            JobStatus::Finished => "finished",
            JobStatus::Failed => "failed",
            JobStatus::Deferred => "deferred",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created" => Some(JobStatus::Created),
            "queued" => Some(JobStatus::Queued),
            "started" => Some(JobStatus::Started),
            "finished" => Some(JobStatus::Finished),
            "failed" => Some(JobStatus::Failed),
            "deferred" => Some(JobStatus::Deferred),
            _ => None,
        }
    }
}

/// Options accepted by `Queue::enqueue` (spec.md §4.1).
///
/// `blocked_by` is an alias for `depends_on`; when both are supplied,
/// `blocked_by` wins (spec.md §4.1).
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    pub timeout: Option<u64>,
    pub result_ttl: Option<u64>,
    pub description: Option<String>,
    pub depends_on: Vec<String>,
    pub blocked_by: Vec<String>,
    pub deferred: bool,
}

impl JobOptions {
    /// The effective, resolved dependency list after the `blocked_by` alias
    /// is applied.
    pub fn resolved_dependencies(&self) -> Vec<String> {
        if !self.blocked_by.is_empty() {
            self.blocked_by.clone()
        } else {
            self.depends_on.clone()
        }
    }
}

/// A unit of work: identity, status, payload reference, dependency edges,
/// origin queue, and timing metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub origin: String,
    /// Opaque blob — the core never interprets the callable/args/kwargs it
    /// encodes. Serialization format is an external collaborator's concern.
    pub payload: Vec<u8>,
    pub description: Option<String>,
    pub timeout: Option<u64>,
    pub result_ttl: Option<u64>,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub exc_info: Option<String>,
    pub dependencies: Vec<String>,
}

impl Job {
    /// Creates a new, not-yet-persisted Job Record. `init_status` is
    /// decided by the caller (Path A/B/C of spec.md §4.3) since it depends
    /// on whether dependencies or deferral are in play.
    pub fn new(payload: Vec<u8>, options: &JobOptions, init_status: JobStatus) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: init_status,
            origin: String::new(),
            payload,
            description: options.description.clone(),
            timeout: options.timeout,
            result_ttl: options.result_ttl,
            enqueued_at: None,
            ended_at: None,
            exc_info: None,
            dependencies: options.resolved_dependencies(),
        }
    }

    pub fn key(&self) -> String {
        keys::job_key(&self.id)
    }

    pub fn dependents_key(&self) -> String {
        keys::dependents_key(&self.id)
    }

    pub fn is_deferred(&self) -> bool {
        self.status == JobStatus::Deferred
    }

    /// Persists every field of this Job Record as a hash (spec.md §3
    /// invariant 5: enqueue sets `origin`/`enqueued_at`; callers that must
    /// preserve them — e.g. quarantine — save before mutating them).
    pub async fn save(&self, store: &dyn Store) -> Result<(), CoreError> {
        let mut fields = vec![
            ("id".to_string(), self.id.clone()),
            ("status".to_string(), self.status.as_str().to_string()),
            ("origin".to_string(), self.origin.clone()),
            ("payload".to_string(), encode_payload(&self.payload)),
            ("dependencies".to_string(), self.dependencies.join(",")),
        ];
        if let Some(d) = &self.description {
            fields.push(("description".to_string(), d.clone()));
        }
        if let Some(t) = self.timeout {
            fields.push(("timeout".to_string(), t.to_string()));
        }
        if let Some(t) = self.result_ttl {
            fields.push(("result_ttl".to_string(), t.to_string()));
        }
        if let Some(t) = self.enqueued_at {
            fields.push(("enqueued_at".to_string(), t.to_rfc3339()));
        }
        if let Some(t) = self.ended_at {
            fields.push(("ended_at".to_string(), t.to_rfc3339()));
        }
        if let Some(e) = &self.exc_info {
            fields.push(("exc_info".to_string(), e.clone()));
        }
        store.hash_set_all(&self.key(), fields).await?;
        Ok(())
    }

    /// Loads a Job Record by ID. Returns `Ok(None)` if no record exists —
    /// callers translate that into `CoreError::NoSuchJob` with whatever
    /// context is meaningful at their call site.
    pub async fn fetch(store: &dyn Store, id: &str) -> Result<Option<Job>, CoreError> {
        let key = keys::job_key(id);
        let fields = store.hash_get_all(&key).await?;
        let Some(fields) = fields else {
            return Ok(None);
        };
        decode_job(id, &fields).map(Some)
    }

    pub async fn exists(store: &dyn Store, id: &str) -> Result<bool, CoreError> {
        Ok(store.exists(&keys::job_key(id)).await?)
    }

    /// Deletes this Job Record and its dependents set. Called by
    /// `Queue::empty()` (spec.md §4.1) and explicit cancellation.
    pub async fn cancel(&self, store: &dyn Store) -> Result<(), CoreError> {
        store.delete(&self.key()).await?;
        store.delete(&self.dependents_key()).await?;
        Ok(())
    }

}

fn encode_payload(payload: &[u8]) -> String {
    // Opaque-blob storage: base64 so arbitrary bytes survive as a hash
    // field (the Store's hash values are text).
    base64_encode(payload)
}

fn decode_job(id: &str, fields: &HashMap<String, String>) -> Result<Job, CoreError> {
    let status_str = fields.get("status").map(String::as_str).unwrap_or("");
    let status = JobStatus::parse(status_str).ok_or_else(|| CoreError::DecodeJob {
        job_id: id.to_string(),
        queue_name: fields.get("origin").cloned().unwrap_or_default(),
        reason: format!("unrecognized status '{}'", status_str),
    })?;
    let payload = fields
        .get("payload")
        .map(|p| base64_decode(p))
        .transpose()
        .map_err(|reason| CoreError::DecodeJob {
            job_id: id.to_string(),
            queue_name: fields.get("origin").cloned().unwrap_or_default(),
            reason,
        })?
        .unwrap_or_default();
    let dependencies = fields
        .get("dependencies")
        .map(|d| {
            d.split(',')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Ok(Job {
        id: id.to_string(),
        status,
        origin: fields.get("origin").cloned().unwrap_or_default(),
        payload,
        description: fields.get("description").cloned(),
        timeout: fields.get("timeout").and_then(|v| v.parse().ok()),
        result_ttl: fields.get("result_ttl").and_then(|v| v.parse().ok()),
        enqueued_at: fields
            .get("enqueued_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc)),
        ended_at: fields
            .get("ended_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|d| d.with_timezone(&Utc)),
        exc_info: fields.get("exc_info").cloned(),
        dependencies,
    })
}

/// Minimal base64 codec so `Job::payload` round-trips as hash text without
/// pulling in a dedicated base64 crate for a single call site.
fn base64_encode(data: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::with_capacity((data.len() + 2) / 3 * 4);
    for chunk in data.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);
        let n = ((b0 as u32) << 16) | ((b1 as u32) << 8) | (b2 as u32);
        out.push(ALPHABET[((n >> 18) & 0x3F) as usize] as char);
        out.push(ALPHABET[((n >> 12) & 0x3F) as usize] as char);
        out.push(if chunk.len() > 1 {
            ALPHABET[((n >> 6) & 0x3F) as usize] as char
        } else {
            '='
        });
        out.push(if chunk.len() > 2 {
            ALPHABET[(n & 0x3F) as usize] as char
        } else {
            '='
        });
    }
    out
}

fn base64_decode(s: &str) -> Result<Vec<u8>, String> {
    fn val(c: u8) -> Option<u32> {
        match c {
            b'A'..=b'Z' => Some((c - b'A') as u32),
            b'a'..=b'z' => Some((c - b'a' + 26) as u32),
            b'0'..=b'9' => Some((c - b'0' + 52) as u32),
            b'+' => Some(62),
            b'/' => Some(63),
            _ => None,
        }
    }
    let s = s.trim_end_matches('=');
    let mut out = Vec::with_capacity(s.len() * 3 / 4);
    let bytes = s.as_bytes();
    for chunk in bytes.chunks(4) {
        let mut n: u32 = 0;
        let mut bits = 0;
        for &c in chunk {
            let v = val(c).ok_or_else(|| format!("invalid base64 byte '{}'", c as char))?;
            n = (n << 6) | v;
            bits += 6;
        }
        n <<= 24 - bits;
        let out_bytes = bits / 8;
        for i in 0..out_bytes {
            out.push(((n >> (16 - i * 8)) & 0xFF) as u8);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[tokio::test]
    async fn save_and_fetch_round_trips_all_fields() {
        let store = InMemoryStore::new();
        let options = JobOptions {
            timeout: Some(42),
            result_ttl: Some(600),
            description: Some("say hello".to_string()),
            depends_on: vec!["p1".to_string()],
            blocked_by: vec![],
            deferred: false,
        };
        let mut job = Job::new(b"payload-bytes".to_vec(), &options, JobStatus::Queued);
        job.origin = "default".to_string();
        job.enqueued_at = Some(Utc::now());
        job.save(&store).await.unwrap();

        let loaded = Job::fetch(&store, &job.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
        assert_eq!(loaded.status, JobStatus::Queued);
        assert_eq!(loaded.origin, "default");
        assert_eq!(loaded.payload, b"payload-bytes".to_vec());
        assert_eq!(loaded.timeout, Some(42));
        assert_eq!(loaded.result_ttl, Some(600));
        assert_eq!(loaded.description.as_deref(), Some("say hello"));
        assert_eq!(loaded.dependencies, vec!["p1".to_string()]);
    }

    #[tokio::test]
    async fn fetch_missing_job_returns_none() {
        let store = InMemoryStore::new();
        let loaded = Job::fetch(&store, "does-not-exist").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn cancel_deletes_record_and_dependents_set() {
        let store = InMemoryStore::new();
        let job = Job::new(b"p".to_vec(), &JobOptions::default(), JobStatus::Queued);
        job.save(&store).await.unwrap();
        store.set_add(&job.dependents_key(), "child").await.unwrap();

        job.cancel(&store).await.unwrap();

        assert!(Job::fetch(&store, &job.id).await.unwrap().is_none());
        assert_eq!(store.set_card(&job.dependents_key()).await.unwrap(), 0);
    }

    #[test]
    fn base64_round_trips_arbitrary_bytes() {
        let data = vec![0u8, 1, 2, 250, 251, 252, 253, 254, 255, 7];
        let encoded = base64_encode(&data);
        let decoded = base64_decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn blocked_by_wins_over_depends_on() {
        let options = JobOptions {
            depends_on: vec!["a".to_string()],
            blocked_by: vec!["b".to_string()],
            ..Default::default()
        };
        assert_eq!(options.resolved_dependencies(), vec!["b".to_string()]);
    }
}
