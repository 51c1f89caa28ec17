//! REST API client for the research engine HTTP endpoints.
//!
//! Wraps `POST /research` (run the full pipeline for one task) and
//! `GET /health` using [`reqwest`].

use std::time::Duration;

use resq_core::types::DbId;
use serde::{Deserialize, Serialize};

/// Longest body excerpt kept as error detail when the engine's error
/// response is not the usual `{"detail": ...}` JSON.
const MAX_BODY_DETAIL_LEN: usize = 1024;

/// HTTP client for a single research engine instance.
#[derive(Debug, Clone)]
pub struct ResearchEngineApi {
    client: reqwest::Client,
    api_url: String,
}

/// Body sent to `POST /research`.
#[derive(Debug, Serialize)]
struct ResearchRequest<'a> {
    task: &'a str,
    /// Correlation only; the engine tags its logs with it.
    job_id: DbId,
}

/// Error body the engine returns on failure.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

/// Errors from the research engine REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ResearchEngineError {
    /// No response within the configured request timeout.
    #[error("Research engine request timed out")]
    Timeout,

    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// The engine returned a non-2xx status code.
    #[error("Research engine error ({status})")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// `detail` field of the error body, when present.
        detail: Option<String>,
        /// Raw response body for debugging.
        body: String,
    },

    /// A 2xx response whose body was not valid JSON.
    #[error("Invalid research engine response: {0}")]
    Decode(String),
}

impl ResearchEngineError {
    /// Provider-supplied detail string, if the engine sent one.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::ApiError { detail: Some(d), .. } => Some(d.clone()),
            Self::ApiError { body, .. } if !body.is_empty() => {
                Some(body.chars().take(MAX_BODY_DETAIL_LEN).collect())
            }
            _ => None,
        }
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Request(e)
        }
    }
}

impl ResearchEngineApi {
    /// Create a new API client for a research engine instance.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000`.
    /// * `request_timeout` - Hard upper bound on a single request.
    pub fn new(api_url: &str, request_timeout: Duration) -> Result<Self, ResearchEngineError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(ResearchEngineError::Request)?;
        Ok(Self::with_client(client, api_url))
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: &str) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Run the research pipeline for `task`.
    ///
    /// Sends `POST /research` and returns the engine's JSON response
    /// unchanged. The call can legitimately take minutes.
    pub async fn research(
        &self,
        job_id: DbId,
        task: &str,
    ) -> Result<serde_json::Value, ResearchEngineError> {
        let response = self
            .client
            .post(format!("{}/research", self.api_url))
            .json(&ResearchRequest { task, job_id })
            .send()
            .await
            .map_err(ResearchEngineError::from_reqwest)?;

        let response = Self::ensure_success(response).await?;
        response
            .json::<serde_json::Value>()
            .await
            .map_err(ResearchEngineError::from_reqwest)
    }

    /// Check `GET /health`.
    pub async fn health(&self) -> Result<(), ResearchEngineError> {
        let response = self
            .client
            .get(format!("{}/health", self.api_url))
            .send()
            .await
            .map_err(ResearchEngineError::from_reqwest)?;

        Self::ensure_success(response).await?;
        Ok(())
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. On failure, pull the
    /// `detail` field out of the error body when it has one.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ResearchEngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(ResearchEngineError::ApiError {
            status: status.as_u16(),
            detail: parse_detail(&body),
            body,
        })
    }
}

/// Extract `detail` from an error body. String details are returned as-is;
/// structured ones (validation errors) are returned as compact JSON.
fn parse_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
