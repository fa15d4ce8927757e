//! Error types for the styleforge library.
//!
//! One enum covers the whole pipeline, but its variants map onto distinct
//! failure classes with distinct handling at the request boundary:
//!
//! * `Validation` — a required request field is missing. Surfaced to the user
//!   verbatim, no diagnostics attached.
//! * `Transfer` / `TransferTimeout` — an input fetch failed. Aborts the job,
//!   surfaced with the URL and reason. Never retried here; retries, if any,
//!   belong to the caller.
//! * `SchemaMismatch` — the workflow template and the code disagree about a
//!   slot address. This is version drift, not a per-job condition: it is
//!   raised at service init and should fail deployment health, not just the
//!   request that happened to trigger it.
//! * `Backend` — the rendering backend refused or failed the workflow.
//!   Resource exhaustion gets its own variant inside
//!   [`crate::backend::BackendError`] so the handler can emit actionable
//!   guidance instead of a raw backend dump.
//!
//! Everything propagates with `?` up to [`crate::handler::handle`], which is
//! the single place errors become response mappings.

use std::path::PathBuf;
use thiserror::Error;

use crate::backend::BackendError;

/// All errors returned by the styleforge library.
#[derive(Debug, Error)]
pub enum StyleForgeError {
    // ── Request errors ────────────────────────────────────────────────────
    /// A required request field is absent or empty.
    ///
    /// The message is the exact user-facing text; the handler forwards it
    /// unchanged as `{"error": ...}`.
    #[error("{0}")]
    Validation(String),

    // ── Fetch errors ──────────────────────────────────────────────────────
    /// HTTP fetch of a source image failed (transport error or non-2xx).
    #[error("Failed to fetch '{url}': {reason}")]
    Transfer { url: String, reason: String },

    /// Fetch exceeded the configured timeout budget.
    #[error("Fetch timed out after {secs}s for '{url}'")]
    TransferTimeout { url: String, secs: u64 },

    // ── Workflow errors ───────────────────────────────────────────────────
    /// The workflow template lacks a slot the parameterizer must write.
    ///
    /// Indicates template/code version drift. Fatal and unrecoverable for
    /// this process — a retry with the same template cannot succeed.
    #[error("Workflow template is missing slot '{input}' on node '{node}' (template/code version drift)")]
    SchemaMismatch { node: String, input: String },

    /// The bundled or supplied template text is not valid JSON.
    #[error("Workflow template is not valid JSON: {0}")]
    TemplateParse(#[from] serde_json::Error),

    // ── Backend errors ────────────────────────────────────────────────────
    /// The rendering backend refused or failed the workflow.
    #[error(transparent)]
    Backend(#[from] BackendError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Filesystem operation on the workspace failed.
    #[error("Workspace I/O failed at '{path}': {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StyleForgeError {
    /// Shorthand for a workspace I/O failure at `path`.
    pub(crate) fn workspace(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Workspace {
            path: path.into(),
            source,
        }
    }
}
