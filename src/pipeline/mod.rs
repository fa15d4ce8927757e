//! Pipeline stages for one render job.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets us swap
//! implementations without touching other stages.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ workflow ──▶ backend ──▶ collect ──▶ encode
//! (inputs)  (resolve)    (render)    (walk)     (base64)
//! ```
//!
//! 1. [`fetch`]    — download both source images and normalize them to PNG;
//!    [`disposition`] recovers a suggested filename for opaque payloads
//! 2. [`workflow`] — write the job's values into the template's fixed slots
//! 3. [`collect`]  — walk the output directory for rendered files
//! 4. [`encode`]   — base64-wrap every image artifact for the response body

pub mod collect;
pub mod disposition;
pub mod encode;
pub mod fetch;
pub mod workflow;
