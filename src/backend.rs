//! Rendering-backend seam.
//!
//! The pipeline treats the backend as an opaque service with four operations:
//! load a workflow document, connect, run a loaded workflow to completion,
//! and clear the pending queue. [`RenderBackend`] is the trait seam;
//! [`HttpRenderBackend`] implements it against the ComfyUI-style HTTP API
//! (`POST /prompt`, `GET /history/{id}`, `POST /queue`, `GET /system_stats`).
//! Tests inject their own implementation instead.
//!
//! `run_workflow` is deliberately synchronous from the caller's point of
//! view: it returns only when the backend reports completion or failure.
//! There is no cancellation — a submitted workflow runs to its end.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from the rendering backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Could not reach the backend at all.
    #[error("Backend connection error: {0}")]
    Connection(String),

    /// The backend refused the submitted workflow document.
    #[error("Workflow rejected by backend: {0}")]
    Rejected(String),

    /// The workflow ran but the backend reported an execution failure.
    #[error("Workflow execution failed: {0}")]
    Execution(String),

    /// The backend ran out of accelerator memory mid-render.
    ///
    /// Kept distinct from [`BackendError::Execution`] so the request handler
    /// can answer with actionable guidance instead of the raw backend dump.
    #[error("Backend ran out of accelerator memory: {0}")]
    ResourceExhausted(String),
}

/// Handle to a workflow the backend has accepted.
#[derive(Debug, Clone)]
pub struct WorkflowHandle {
    /// Backend-assigned identifier for the queued workflow.
    pub id: String,
}

/// The opaque rendering service the pipeline submits to.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Verify the backend is reachable. Called once at service init.
    async fn connect(&self) -> Result<(), BackendError>;

    /// Submit a fully-resolved workflow document, returning a handle.
    async fn load_workflow(&self, document: &Value) -> Result<WorkflowHandle, BackendError>;

    /// Block until the workflow behind `handle` completes or fails.
    async fn run_workflow(&self, handle: &WorkflowHandle) -> Result<(), BackendError>;

    /// Drop every pending task from the backend's queue.
    async fn clear_queue(&self) -> Result<(), BackendError>;
}

/// [`RenderBackend`] over the ComfyUI-style HTTP API.
pub struct HttpRenderBackend {
    api_url: String,
    /// Unique client ID sent with every submission so the backend can
    /// correlate follow-up requests.
    client_id: String,
    http: reqwest::Client,
    poll_interval: Duration,
}

impl HttpRenderBackend {
    /// Create a backend client for `api_url` (e.g. `http://127.0.0.1:8188`).
    pub fn new(api_url: impl Into<String>, poll_interval_ms: u64) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
            http: reqwest::Client::new(),
            poll_interval: Duration::from_millis(poll_interval_ms),
        }
    }

    /// Base HTTP API URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Classify an execution failure message, separating memory exhaustion
    /// from everything else.
    fn execution_error(message: String) -> BackendError {
        let lower = message.to_lowercase();
        if lower.contains("out of memory") || lower.contains("oom") {
            BackendError::ResourceExhausted(message)
        } else {
            BackendError::Execution(message)
        }
    }
}

#[async_trait]
impl RenderBackend for HttpRenderBackend {
    async fn connect(&self) -> Result<(), BackendError> {
        let url = format!("{}/system_stats", self.api_url);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| BackendError::Connection(format!("{}: {e}", self.api_url)))?;
        if !response.status().is_success() {
            return Err(BackendError::Connection(format!(
                "{} answered HTTP {}",
                self.api_url,
                response.status()
            )));
        }
        info!(client_id = %self.client_id, "Connected to rendering backend at {}", self.api_url);
        Ok(())
    }

    async fn load_workflow(&self, document: &Value) -> Result<WorkflowHandle, BackendError> {
        let url = format!("{}/prompt", self.api_url);
        let body = json!({ "prompt": document, "client_id": self.client_id });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(BackendError::Rejected(format!("HTTP {status}: {text}")));
        }

        let accepted: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Rejected(format!("unreadable acceptance: {e}")))?;
        let id = accepted
            .get("prompt_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                BackendError::Rejected("acceptance response carries no prompt_id".into())
            })?
            .to_string();

        debug!(workflow_id = %id, "Workflow accepted by backend");
        Ok(WorkflowHandle { id })
    }

    async fn run_workflow(&self, handle: &WorkflowHandle) -> Result<(), BackendError> {
        let url = format!("{}/history/{}", self.api_url, handle.id);

        // Poll until the history entry appears with a terminal status. A job,
        // once submitted, runs to completion or backend-reported failure, so
        // there is no overall deadline here.
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| BackendError::Connection(e.to_string()))?;
            if !response.status().is_success() {
                return Err(BackendError::Execution(format!(
                    "history endpoint answered HTTP {}",
                    response.status()
                )));
            }

            let history: Value = response
                .json()
                .await
                .map_err(|e| BackendError::Execution(format!("unreadable history: {e}")))?;
            let Some(entry) = history.get(handle.id.as_str()) else {
                debug!(workflow_id = %handle.id, "Workflow still pending");
                continue;
            };

            let status = entry.get("status").cloned().unwrap_or(Value::Null);
            if status
                .get("completed")
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                info!(workflow_id = %handle.id, "Workflow completed");
                return Ok(());
            }
            if status.get("status_str").and_then(Value::as_str) == Some("error") {
                let detail = status
                    .get("messages")
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| "backend reported an execution error".to_string());
                return Err(Self::execution_error(detail));
            }
        }
    }

    async fn clear_queue(&self) -> Result<(), BackendError> {
        let url = format!("{}/queue", self.api_url);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "clear": true }))
            .send()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BackendError::Execution(format!(
                "queue clear answered HTTP {}",
                response.status()
            )));
        }
        debug!("Backend queue cleared");
        Ok(())
    }
}
