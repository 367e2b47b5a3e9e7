//! Error taxonomy for the queue core, plus user-friendly response mapping.
//!
//! Mirrors the teacher's error-handling layout: typed error enums, an
//! `ErrorExt` trait for machine-readable codes / user-facing messages /
//! backend log context / severity, and a small `ErrorContext` struct for
//! attaching job/queue identifiers when an error escapes a public operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error severity levels for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    /// Expected, routine condition (e.g. a non-blocking dequeue found nothing).
    Info,
    /// Recovered internally without surfacing to the caller.
    Warning,
    /// Surfaced to the caller as a typed error.
    Error,
    /// Safety cap exceeded; indicates sustained contention or a stuck backend.
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorSeverity::Info => write!(f, "info"),
            ErrorSeverity::Warning => write!(f, "warning"),
            ErrorSeverity::Error => write!(f, "error"),
            ErrorSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Context attached to an error as it escapes a public operation, so a
/// caller can quarantine the offending job rather than crash-loop.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ErrorContext {
    pub job_id: Option<String>,
    pub queue_name: Option<String>,
}

/// Errors surfaced by Store backends (Redis round-trip failures, codec
/// failures on the raw bytes stored in a hash field, and so on).
#[derive(Debug, Clone)]
pub enum StoreError {
    /// Connection to the backend failed or dropped mid-operation.
    ConnectionFailed(String),
    /// The backend returned something the Store layer didn't expect.
    Protocol(String),
    /// A watched key was modified before the transaction committed, after
    /// exhausting the retry budget.
    WatchContentionExhausted { key: String, attempts: u32 },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::ConnectionFailed(msg) => write!(f, "store connection failed: {}", msg),
            StoreError::Protocol(msg) => write!(f, "store protocol error: {}", msg),
            StoreError::WatchContentionExhausted { key, attempts } => write!(
                f,
                "watch contention on '{}' exceeded {} attempts",
                key, attempts
            ),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_io_error() {
            StoreError::ConnectionFailed(err.to_string())
        } else {
            StoreError::Protocol(err.to_string())
        }
    }
}

/// The core's public error taxonomy (spec.md §7).
#[derive(Debug, Clone)]
pub enum CoreError {
    /// Referenced job has no backing record, or a release was attempted on
    /// an ID not present in the Deferred Set.
    NoSuchJob { job_id: String, context: String },
    /// A state-machine rule was violated (release on a non-deferred job,
    /// requeue on a non-failed job).
    InvalidJobOperation { job_id: String, reason: String },
    /// A blocking multi-queue dequeue expired without a job.
    DequeueTimeout {
        timeout_secs: u64,
        queue_keys: Vec<String>,
    },
    /// A Job Record exists but its payload could not be materialized.
    DecodeJob {
        job_id: String,
        queue_name: String,
        reason: String,
    },
    /// Programmatic misuse: timeout=0 on a blocking dequeue, an invalid
    /// queue key prefix passed to `from_queue_key`, etc.
    ValueError(String),
    /// A watch/transaction retry loop exceeded its safety cap.
    WatchContention { key: String, attempts: u32 },
    /// The Store backend itself failed.
    Store(StoreError),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.error_code(), self.user_message())
    }
}

impl std::error::Error for CoreError {}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        CoreError::Store(err)
    }
}

/// Machine-readable code, user-facing message, log context, and severity
/// for an error. Kept separate from `Display` so a caller can choose how
/// much detail to expose.
pub trait ErrorExt {
    fn error_code(&self) -> String;
    fn user_message(&self) -> String;
    fn log_context(&self) -> String;
    fn severity(&self) -> ErrorSeverity;
}

impl ErrorExt for CoreError {
    fn error_code(&self) -> String {
        match self {
            CoreError::NoSuchJob { .. } => "CORE_NO_SUCH_JOB".to_string(),
            CoreError::InvalidJobOperation { .. } => "CORE_INVALID_JOB_OPERATION".to_string(),
            CoreError::DequeueTimeout { .. } => "CORE_DEQUEUE_TIMEOUT".to_string(),
            CoreError::DecodeJob { .. } => "CORE_DECODE_JOB".to_string(),
            CoreError::ValueError(_) => "CORE_VALUE_ERROR".to_string(),
            CoreError::WatchContention { .. } => "CORE_WATCH_CONTENTION".to_string(),
            CoreError::Store(_) => "CORE_STORE_ERROR".to_string(),
        }
    }

    fn user_message(&self) -> String {
        match self {
            CoreError::NoSuchJob { job_id, .. } => format!("no such job '{}'", job_id),
            CoreError::InvalidJobOperation { reason, .. } => reason.clone(),
            CoreError::DequeueTimeout { timeout_secs, .. } => {
                format!("dequeue timed out after {}s", timeout_secs)
            }
            CoreError::DecodeJob { job_id, .. } => {
                format!("job '{}' could not be decoded", job_id)
            }
            CoreError::ValueError(msg) => msg.clone(),
            CoreError::WatchContention { key, .. } => {
                format!("too much contention updating '{}'", key)
            }
            CoreError::Store(err) => err.to_string(),
        }
    }

    fn log_context(&self) -> String {
        let timestamp = Utc::now().to_rfc3339();
        let mut context = format!(
            "[{}] error_code={} severity={} timestamp={}",
            self.error_code(),
            self.error_code(),
            self.severity(),
            timestamp
        );
        match self {
            CoreError::NoSuchJob { job_id, context: c } => {
                context.push_str(&format!(" job_id=\"{}\" context=\"{}\"", job_id, c));
            }
            CoreError::InvalidJobOperation { job_id, reason } => {
                context.push_str(&format!(" job_id=\"{}\" reason=\"{}\"", job_id, reason));
            }
            CoreError::DequeueTimeout {
                timeout_secs,
                queue_keys,
            } => {
                context.push_str(&format!(
                    " timeout_secs={} queue_keys=[{}]",
                    timeout_secs,
                    queue_keys.join(", ")
                ));
            }
            CoreError::DecodeJob {
                job_id,
                queue_name,
                reason,
            } => {
                context.push_str(&format!(
                    " job_id=\"{}\" queue=\"{}\" reason=\"{}\"",
                    job_id, queue_name, reason
                ));
            }
            CoreError::ValueError(msg) => {
                context.push_str(&format!(" reason=\"{}\"", msg));
            }
            CoreError::WatchContention { key, attempts } => {
                context.push_str(&format!(" key=\"{}\" attempts={}", key, attempts));
            }
            CoreError::Store(err) => {
                context.push_str(&format!(" reason=\"{}\"", err));
            }
        }
        context
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            CoreError::NoSuchJob { .. } | CoreError::InvalidJobOperation { .. } => {
                ErrorSeverity::Warning
            }
            CoreError::DequeueTimeout { .. } => ErrorSeverity::Info,
            CoreError::DecodeJob { .. } | CoreError::ValueError(_) => ErrorSeverity::Error,
            CoreError::WatchContention { .. } => ErrorSeverity::Critical,
            CoreError::Store(_) => ErrorSeverity::Error,
        }
    }
}

/// User-friendly error response, safe to hand back across a process
/// boundary without leaking Store internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub user_message: String,
    pub severity: String,
    pub timestamp: String,
}

pub fn create_error_response<E: ErrorExt>(error: &E) -> ErrorResponse {
    ErrorResponse {
        error_code: error.error_code(),
        user_message: error.user_message(),
        severity: error.severity().to_string(),
        timestamp: Utc::now().to_rfc3339(),
    }
}
