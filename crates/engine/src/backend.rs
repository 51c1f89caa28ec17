//! Trait seam between the worker and whatever runs the research.

use async_trait::async_trait;
use resq_core::types::DbId;

use crate::api::{ResearchEngineApi, ResearchEngineError};

/// Something that can run one research task to completion.
///
/// Implementations must be safe to share across tasks; the worker holds
/// one behind an `Arc`.
#[async_trait]
pub trait ResearchBackend: Send + Sync {
    /// Run `task` and return the structured result.
    ///
    /// `job_id` is passed for correlation only.
    async fn run_research(
        &self,
        job_id: DbId,
        task: &str,
    ) -> Result<serde_json::Value, ResearchEngineError>;
}

#[async_trait]
impl ResearchBackend for ResearchEngineApi {
    async fn run_research(
        &self,
        job_id: DbId,
        task: &str,
    ) -> Result<serde_json::Value, ResearchEngineError> {
        tracing::debug!(job_id, api_url = %self.api_url(), "Submitting task to research engine");
        self.research(job_id, task).await
    }
}
