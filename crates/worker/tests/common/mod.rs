//! Shared helpers for worker integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use resq_core::retry::RetryPolicy;
use resq_core::types::DbId;
use resq_engine::{ResearchBackend, ResearchEngineError};
use resq_worker::runner::WorkerSettings;
use serde_json::{json, Value};

pub const MAX_RETRIES: i32 = 3;

pub fn settings(name: &str) -> WorkerSettings {
    WorkerSettings {
        name: name.to_string(),
        poll_interval: Duration::from_millis(10),
        dispatch_timeout: Duration::from_secs(5),
        retry_policy: RetryPolicy::new(MAX_RETRIES).unwrap(),
    }
}

pub fn engine_500(detail: &str) -> ResearchEngineError {
    ResearchEngineError::ApiError {
        status: 500,
        detail: Some(detail.to_string()),
        body: json!({ "detail": detail }).to_string(),
    }
}

pub fn research_payload(task: &str) -> Value {
    json!({
        "status": "completed",
        "task": task,
        "result": {"summary": format!("Findings on {task}")},
    })
}

/// Backend that replays a fixed script of responses, then succeeds.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<Value, ResearchEngineError>>>,
    calls: Mutex<Vec<(DbId, String)>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<Value, ResearchEngineError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn always_ok() -> Self {
        Self::default()
    }

    /// Every call sleeps for `delay` before answering.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(DbId, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResearchBackend for ScriptedBackend {
    async fn run_research(&self, job_id: DbId, task: &str) -> Result<Value, ResearchEngineError> {
        self.calls.lock().unwrap().push((job_id, task.to_string()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(research_payload(task)))
    }
}
