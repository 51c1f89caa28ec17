//! Dispatcher: hands one claimed job to the research engine.
//!
//! This is the only long-latency step of a cycle. It never runs inside a
//! database transaction.

use std::sync::Arc;
use std::time::Duration;

use resq_core::types::DbId;
use resq_engine::{ResearchBackend, ResearchEngineError};

/// Failure of a single dispatch attempt.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The hard timeout elapsed before the engine answered.
    #[error("Research engine did not respond within {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error(transparent)]
    Engine(#[from] ResearchEngineError),
}

impl DispatchError {
    /// Provider-supplied detail, if any, for the failure record.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::TimedOut { .. } => None,
            Self::Engine(e) => e.detail(),
        }
    }
}

/// Sends claimed jobs to a [`ResearchBackend`] under a hard timeout.
#[derive(Clone)]
pub struct Dispatcher {
    backend: Arc<dyn ResearchBackend>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(backend: Arc<dyn ResearchBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Run the research for one job and wait for its result.
    ///
    /// There is no cooperative cancellation: if the backend is still busy
    /// when the timeout fires, the call is dropped and reported as
    /// [`DispatchError::TimedOut`].
    pub async fn dispatch(
        &self,
        job_id: DbId,
        task: &str,
    ) -> Result<serde_json::Value, DispatchError> {
        match tokio::time::timeout(self.timeout, self.backend.run_research(job_id, task)).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(DispatchError::TimedOut {
                timeout: self.timeout,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    struct Sleepy(Duration);

    #[async_trait]
    impl ResearchBackend for Sleepy {
        async fn run_research(
            &self,
            _job_id: DbId,
            task: &str,
        ) -> Result<serde_json::Value, ResearchEngineError> {
            tokio::time::sleep(self.0).await;
            Ok(json!({ "task": task }))
        }
    }

    #[tokio::test]
    async fn sub_second_timeout_is_reported_exactly() {
        let dispatcher = Dispatcher::new(
            Arc::new(Sleepy(Duration::from_secs(5))),
            Duration::from_millis(150),
        );

        let err = dispatcher.dispatch(1, "X").await.unwrap_err();
        assert_matches!(err, DispatchError::TimedOut { timeout } if timeout == Duration::from_millis(150));
        assert_eq!(err.to_string(), "Research engine did not respond within 150ms");
        assert_eq!(err.detail(), None);
    }

    #[tokio::test]
    async fn answer_within_timeout_is_returned() {
        let dispatcher = Dispatcher::new(
            Arc::new(Sleepy(Duration::from_millis(1))),
            Duration::from_secs(5),
        );

        let payload = dispatcher.dispatch(7, "X").await.unwrap();
        assert_eq!(payload, json!({ "task": "X" }));
    }

    #[test]
    fn engine_detail_passes_through() {
        let err = DispatchError::from(ResearchEngineError::ApiError {
            status: 500,
            detail: Some("rate limited".into()),
            body: String::new(),
        });
        assert_eq!(err.detail().as_deref(), Some("rate limited"));
    }
}
