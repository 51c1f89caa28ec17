//! Typed view of the `jobs.result` column.
//!
//! The column is a plain JSONB blob. A completed job stores the engine's
//! response verbatim; a failed job stores a [`FailureRecord`]. Which one a
//! given row holds is decided by its status, so the blob itself carries no tag.

use serde::{Deserialize, Serialize};

/// Error text written by the exhausted-job sweep.
pub const MAX_RETRIES_EXCEEDED: &str = "Max retries exceeded";

/// Error text written when a stale job is found with no retries left.
pub const STALE_RETRIES_EXHAUSTED: &str =
    "Job stalled in processing and exceeded max retries";

/// Error payload stored on a job that ended in `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Human-readable error message.
    pub error: String,
    /// Provider-supplied detail string, when the engine returned one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// Total attempts made, including the one that failed last.
    pub attempts: i32,
}

impl FailureRecord {
    pub fn new(error: impl Into<String>, detail: Option<String>, attempts: i32) -> Self {
        Self {
            error: error.into(),
            detail,
            attempts,
        }
    }

    /// Serialize for the `result` column.
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!(self)
    }
}

/// Final outcome of a job as seen at the API boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Success { payload: serde_json::Value },
    Failure(FailureRecord),
}

impl JobOutcome {
    /// Interpret the stored blob of a completed job.
    pub fn from_completed(result: serde_json::Value) -> Self {
        Self::Success { payload: result }
    }

    /// Interpret the stored blob of a failed job.
    ///
    /// Rows written by older tooling may not match [`FailureRecord`]; those
    /// are surfaced with the raw blob as the error text.
    pub fn from_failed(result: Option<serde_json::Value>) -> Self {
        match result {
            Some(value) => match serde_json::from_value::<FailureRecord>(value.clone()) {
                Ok(record) => Self::Failure(record),
                Err(_) => Self::Failure(FailureRecord::new(value.to_string(), None, 0)),
            },
            None => Self::Failure(FailureRecord::new("Unknown failure", None, 0)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
