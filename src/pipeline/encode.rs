//! Result encoding: output file paths → base64 PNG payload.
//!
//! Only visual artifacts matter to the consumer, so non-image files are
//! dropped without complaint. Files that look like images by extension but
//! fail to decode are still included as base64 of their raw bytes — a
//! corrupt-but-nominally-image file is more useful delivered than dropped.

use crate::error::StyleForgeError;
use crate::response::ResponsePayload;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Extensions treated as images. WebP included deliberately — some backends
/// emit it and the consumer expects it delivered.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff"];

/// Whether `path` nominally holds an image, by extension.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Encode `paths` into a response payload.
///
/// Every image is re-encoded as PNG and base64-wrapped; non-images are
/// silently excluded. `elapsed`, when available, becomes the payload's
/// `time` in seconds rounded to two decimals.
pub fn encode_results(
    paths: &[PathBuf],
    elapsed: Option<Duration>,
) -> Result<ResponsePayload, StyleForgeError> {
    let mut images_base64 = Vec::new();

    for path in paths {
        if !is_image_path(path) {
            debug!("Skipping non-image artifact {}", path.display());
            continue;
        }
        let bytes = std::fs::read(path).map_err(|e| StyleForgeError::workspace(path, e))?;
        images_base64.push(encode_image_bytes(&bytes, path));
    }

    Ok(ResponsePayload {
        images_base64,
        time: elapsed.map(|d| round2(d.as_secs_f64())),
    })
}

/// Base64 of the PNG re-encoding, or of the raw bytes when decode fails.
fn encode_image_bytes(bytes: &[u8], path: &Path) -> String {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let mut buf = Vec::new();
            match img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png) {
                Ok(()) => STANDARD.encode(&buf),
                Err(e) => {
                    warn!("PNG re-encode failed for {}: {e}; sending raw bytes", path.display());
                    STANDARD.encode(bytes)
                }
            }
        }
        Err(e) => {
            warn!("Decode failed for {}: {e}; sending raw bytes", path.display());
            STANDARD.encode(bytes)
        }
    }
}

fn round2(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
