//! Response payload returned for a successful job.

use serde::{Deserialize, Serialize};

/// Transport-safe result of one render job.
///
/// Produced once per job by [`crate::pipeline::encode::encode_results`] and
/// immutable once returned. Non-image artifacts never appear here; the
/// consumer only ever wants visual output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsePayload {
    /// Base64-encoded PNGs, in output-directory walk order.
    pub images_base64: Vec<String>,
    /// Elapsed wall-clock seconds, rounded to two decimals. Absent when no
    /// start timestamp was available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
}
