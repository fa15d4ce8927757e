//! The request boundary: validate, default, run, classify.
//!
//! [`handle`] is the `handler(request) -> response` contract. It never
//! returns an error — every code path, including panic-free classification
//! of deep pipeline failures, produces a response mapping. This is the one
//! place user-facing validation happens and the one place errors become
//! `{"error": ...}` shapes.

use crate::error::StyleForgeError;
use crate::job::{JobParams, MAX_SEED};
use crate::pipeline::encode;
use crate::service::RenderService;
use rand::Rng;
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{error, warn};

/// User-facing guidance when the backend exhausts accelerator memory.
const OOM_GUIDANCE: &str =
    "Accelerator out of memory — reduce 'steps' or the image size and try again.";

/// How many cause frames an `{"error", "trace"}` response carries at most.
const TRACE_LIMIT: usize = 5;

/// Handle one request mapping, returning a response mapping.
///
/// The payload is read from the request's `"input"` object when present
/// (worker-envelope style), otherwise from the request itself. A numeric
/// `"created"` epoch timestamp on the envelope, when present, anchors the
/// reported elapsed time; otherwise time is measured from handler entry.
pub async fn handle(service: &RenderService, request: &Value) -> Value {
    let started = Instant::now();

    let payload = request.get("input").filter(|v| v.is_object()).unwrap_or(request);
    let params = match parse_params(payload) {
        Ok(params) => params,
        Err(StyleForgeError::Validation(message)) => return json!({ "error": message }),
        Err(other) => return error_response(&other),
    };

    match service.run_job(&params).await {
        Ok(files) => {
            let elapsed = elapsed_for(request, started);
            match encode::encode_results(&files, Some(elapsed)) {
                Ok(payload) => serde_json::to_value(payload)
                    .unwrap_or_else(|e| error_response(&StyleForgeError::Internal(e.to_string()))),
                Err(e) => error_response(&e),
            }
        }
        Err(e) => error_response(&e),
    }
}

/// Validate required fields and apply the documented defaults.
fn parse_params(payload: &Value) -> Result<JobParams, StyleForgeError> {
    let style_image_url = non_empty_str(payload, "style_image_url");
    let structure_image_url = non_empty_str(payload, "structure_image_url");
    let (Some(style_image_url), Some(structure_image_url)) = (style_image_url, structure_image_url)
    else {
        return Err(StyleForgeError::Validation(
            "'style_image_url' and 'structure_image_url' is required".into(),
        ));
    };
    let Some(prompt) = non_empty_str(payload, "prompt") else {
        return Err(StyleForgeError::Validation("'prompt' is required".into()));
    };

    Ok(JobParams {
        style_image_url: style_image_url.to_string(),
        structure_image_url: structure_image_url.to_string(),
        prompt: prompt.to_string(),
        negative_prompt: payload
            .get("negative_prompt")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        number_of_images: payload
            .get("number_of_images")
            .and_then(Value::as_u64)
            .unwrap_or(1) as u32,
        structure_depth_strength: payload
            .get("structure_depth_strength")
            .and_then(Value::as_f64)
            .unwrap_or(1.0),
        structure_denoising_strength: payload
            .get("structure_denoising_strength")
            .and_then(Value::as_f64)
            .unwrap_or(0.65),
        seed: Some(
            payload
                .get("seed")
                .and_then(Value::as_u64)
                .map(|seed| seed as u32)
                .unwrap_or_else(|| rand::rng().random_range(0..=MAX_SEED)),
        ),
    })
}

fn non_empty_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// Prefer the envelope's `created` epoch seconds; fall back to handler entry.
fn elapsed_for(request: &Value, started: Instant) -> Duration {
    if let Some(created) = request.get("created").and_then(Value::as_f64) {
        if let Ok(now) = SystemTime::now().duration_since(UNIX_EPOCH) {
            let elapsed = now.as_secs_f64() - created;
            if elapsed >= 0.0 {
                return Duration::from_secs_f64(elapsed);
            }
        }
    }
    started.elapsed()
}

/// Classify a pipeline failure into a response mapping.
///
/// Memory exhaustion gets actionable guidance instead of the backend dump;
/// fetch and validation failures surface their message alone; anything
/// unclassified additionally carries a truncated cause trace for diagnostics.
fn error_response(err: &StyleForgeError) -> Value {
    use crate::backend::BackendError;

    match err {
        StyleForgeError::Backend(BackendError::ResourceExhausted(detail)) => {
            warn!("Backend memory exhaustion: {detail}");
            json!({ "error": OOM_GUIDANCE })
        }
        StyleForgeError::Validation(message) => json!({ "error": message }),
        StyleForgeError::Transfer { .. } | StyleForgeError::TransferTimeout { .. } => {
            json!({ "error": err.to_string() })
        }
        StyleForgeError::SchemaMismatch { .. } => {
            // Version drift: the whole deployment is wrong, not this request.
            error!("Fatal template drift: {err}");
            json!({ "error": err.to_string() })
        }
        _ => {
            let mut response = Map::new();
            response.insert("error".into(), Value::String(err.to_string()));
            response.insert("trace".into(), Value::String(cause_trace(err)));
            Value::Object(response)
        }
    }
}

/// The error's cause chain, newest first, truncated to [`TRACE_LIMIT`] frames.
fn cause_trace(err: &(dyn std::error::Error)) -> String {
    let mut frames = vec![err.to_string()];
    let mut current = err.source();
    while let Some(source) = current {
        if frames.len() >= TRACE_LIMIT {
            frames.push("…".into());
            break;
        }
        frames.push(source.to_string());
        current = source.source();
    }
    frames.join("\ncaused by: ")
}
