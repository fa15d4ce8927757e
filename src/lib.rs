//! # styleforge
//!
//! Run style-transfer image generation jobs against a ComfyUI-compatible
//! rendering backend.
//!
//! ## Why this crate?
//!
//! A render worker is mostly plumbing: stage two source images, fill a fixed
//! workflow template with the job's values, hand it to the backend, and ship
//! the results back as base64 PNG. The plumbing is where the bugs live —
//! stale artifacts leaking between jobs, half-fetched inputs, template/code
//! drift. This crate makes each of those failure modes explicit and testable
//! while treating the backend itself as an opaque service.
//!
//! ## Pipeline Overview
//!
//! ```text
//! request
//!  │
//!  ├─ 1. Validate  required fields, defaults, seed   (handler)
//!  ├─ 2. Reset     clear queue + empty workspace     (service)
//!  ├─ 3. Fetch     style + structure → PNG staging   (pipeline::fetch)
//!  ├─ 4. Resolve   job values → template slots       (pipeline::workflow)
//!  ├─ 5. Render    submit & wait on the backend      (backend)
//!  ├─ 6. Collect   walk the output directory         (pipeline::collect)
//!  └─ 7. Encode    images → base64 PNG payload       (pipeline::encode)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use styleforge::{handle, HttpRenderBackend, PipelineConfig, RenderService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::default();
//!     let backend = Arc::new(HttpRenderBackend::new(
//!         config.backend_url.clone(),
//!         config.poll_interval_ms,
//!     ));
//!     let service = RenderService::init(config, backend).await?;
//!
//!     let response = handle(&service, &json!({
//!         "style_image_url": "https://example.com/style.png",
//!         "structure_image_url": "https://example.com/structure.png",
//!         "prompt": "a cat",
//!     })).await;
//!     println!("{response}");
//!     Ok(())
//! }
//! ```
//!
//! One job runs at a time per service: the workspace reset is destructive
//! and `run_job` holds an internal mutex for the whole job. Run more worker
//! processes for more throughput.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod backend;
pub mod config;
pub mod error;
pub mod handler;
pub mod job;
pub mod pipeline;
pub mod response;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use backend::{BackendError, HttpRenderBackend, RenderBackend, WorkflowHandle};
pub use config::{PipelineConfig, PipelineConfigBuilder, USER_AGENT};
pub use error::StyleForgeError;
pub use handler::handle;
pub use job::{JobParams, MAX_SEED};
pub use pipeline::fetch::{FetchedMedia, MediaKind};
pub use pipeline::workflow::WorkflowTemplate;
pub use response::ResponsePayload;
pub use service::RenderService;
