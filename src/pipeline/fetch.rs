//! Media fetching: download a remote resource and stage it under a
//! caller-chosen name.
//!
//! ## Why normalize images to PNG?
//!
//! The workflow template addresses its inputs by a predictable filename, and
//! the backend's loaders are happiest with one canonical encoding. Decoding
//! whatever arrives (JPEG, GIF, BMP, WebP) and re-encoding as PNG removes a
//! whole class of format-specific failures downstream, while non-image
//! payloads are preserved byte-for-byte.
//!
//! The image-or-not decision is an expected branch, not an error:
//! [`classify_and_persist`] returns a [`MediaKind`] instead of using decode
//! failure as control flow.

use crate::config::USER_AGENT;
use crate::error::StyleForgeError;
use crate::pipeline::disposition;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a fetched payload turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaKind {
    /// A decodable image, re-encoded and persisted as PNG.
    NormalizedImage,
    /// Anything else, persisted verbatim. `extension` is the lower-cased
    /// extension recovered from the original filename, without the leading
    /// dot; empty when none was recoverable.
    Opaque { extension: String },
}

impl MediaKind {
    /// Short tag for logs and result metadata: `"png"` for normalized
    /// images, the original extension otherwise.
    pub fn tag(&self) -> &str {
        match self {
            MediaKind::NormalizedImage => "png",
            MediaKind::Opaque { extension } => extension,
        }
    }
}

/// The outcome of one fetch.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    /// Absolute path of the persisted file.
    pub path: PathBuf,
    /// Detected media kind.
    pub kind: MediaKind,
    /// Best-effort original filename from transport metadata or the URL path.
    pub original_name: String,
}

/// Download `url` and persist it under `name` inside `directory`.
///
/// Images are normalized to PNG; anything else is written verbatim with the
/// extension recovered from its original name. Fails on transport errors,
/// timeouts, and non-2xx statuses — a single failed fetch fails the job, so
/// there is no retry here.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    name: &str,
    directory: &Path,
    timeout_secs: u64,
) -> Result<FetchedMedia, StyleForgeError> {
    std::fs::create_dir_all(directory).map_err(|e| StyleForgeError::workspace(directory, e))?;

    info!("Fetching {}", url);
    let response = client
        .get(url)
        .header(reqwest::header::USER_AGENT, USER_AGENT)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                StyleForgeError::TransferTimeout {
                    url: url.to_string(),
                    secs: timeout_secs,
                }
            } else {
                StyleForgeError::Transfer {
                    url: url.to_string(),
                    reason: e.to_string(),
                }
            }
        })?;

    if !response.status().is_success() {
        return Err(StyleForgeError::Transfer {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let original_name = recover_original_name(url, &response);
    let bytes = response.bytes().await.map_err(|e| StyleForgeError::Transfer {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let (path, kind) = classify_and_persist(&bytes, name, directory, &original_name)?;
    debug!(
        kind = kind.tag(),
        original = %original_name,
        "Persisted {} ({} bytes)",
        path.display(),
        bytes.len()
    );

    Ok(FetchedMedia {
        path,
        kind,
        original_name,
    })
}

/// Decide what `bytes` are and write them to disk accordingly.
///
/// Image branch: convert off-palette color modes to RGB (or RGBA when the
/// source carries alpha) and save as PNG under `{directory}/{name}.png` —
/// or `{directory}/{name}` when the caller already supplied an extension.
/// Opaque branch: write the bytes untouched under `{directory}/{name}{.ext}`
/// with the extension taken from `original_name`.
pub fn classify_and_persist(
    bytes: &[u8],
    name: &str,
    directory: &Path,
    original_name: &str,
) -> Result<(PathBuf, MediaKind), StyleForgeError> {
    match image::load_from_memory(bytes) {
        Ok(img) => {
            let img = normalize_color(img);
            let file_name = if Path::new(name).extension().is_some() {
                name.to_string()
            } else {
                format!("{name}.png")
            };
            let path = directory.join(file_name);
            img.save_with_format(&path, image::ImageFormat::Png)
                .map_err(|e| StyleForgeError::Internal(format!("PNG encode failed: {e}")))?;
            Ok((absolute(path), MediaKind::NormalizedImage))
        }
        Err(_) => {
            let extension = Path::new(original_name)
                .extension()
                .and_then(|ext| ext.to_str())
                .map(str::to_lowercase)
                .unwrap_or_default();
            let file_name = if extension.is_empty() {
                name.to_string()
            } else {
                format!("{name}.{extension}")
            };
            let path = directory.join(file_name);
            std::fs::write(&path, bytes).map_err(|e| StyleForgeError::workspace(&path, e))?;
            Ok((absolute(path), MediaKind::Opaque { extension }))
        }
    }
}

/// Keep plain RGB and RGBA untouched; convert everything else, preserving an
/// alpha channel when the source has one.
fn normalize_color(img: DynamicImage) -> DynamicImage {
    match img.color() {
        image::ColorType::Rgb8 | image::ColorType::Rgba8 => img,
        color if color.has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
        _ => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

/// Best-effort original filename: `Content-Disposition` first, then the URL
/// path basename, then the literal `"download"`.
fn recover_original_name(url: &str, response: &reqwest::Response) -> String {
    if let Some(header) = response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(name) = disposition::filename(header) {
            return name;
        }
    }

    url_basename(url).unwrap_or_else(|| "download".to_string())
}

/// Last non-empty path segment of `url`, if any.
fn url_basename(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        None
    } else {
        Some(last.to_string())
    }
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn jpeg_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([10, 120, 240])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .expect("jpeg encode");
        buf
    }

    fn gray_png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(4, 4, image::Luma([128])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");
        buf
    }

    #[test]
    fn jpeg_is_persisted_as_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (path, kind) =
            classify_and_persist(&jpeg_bytes(), "image", dir.path(), "photo.jpg").expect("persist");

        assert_eq!(kind, MediaKind::NormalizedImage);
        assert_eq!(kind.tag(), "png");
        assert!(path.is_absolute());
        assert!(path.ends_with("image.png"), "got: {}", path.display());

        let persisted = std::fs::read(&path).expect("read back");
        assert_eq!(&persisted[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn caller_supplied_extension_respected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (path, _) = classify_and_persist(&jpeg_bytes(), "structure.png", dir.path(), "x.jpg")
            .expect("persist");
        assert!(path.ends_with("structure.png"), "got: {}", path.display());
    }

    #[test]
    fn grayscale_converted_to_rgb() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (path, kind) =
            classify_and_persist(&gray_png_bytes(), "image", dir.path(), "g.png").expect("persist");
        assert_eq!(kind, MediaKind::NormalizedImage);

        let img = image::open(&path).expect("decode persisted PNG");
        assert_eq!(img.color(), image::ColorType::Rgb8);
    }

    #[test]
    fn alpha_preserved_for_rgba_sources() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 128])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("png encode");

        let dir = tempfile::tempdir().expect("tempdir");
        let (path, _) = classify_and_persist(&buf, "image", dir.path(), "a.png").expect("persist");
        let back = image::open(&path).expect("decode");
        assert_eq!(back.color(), image::ColorType::Rgba8);
    }

    #[test]
    fn opaque_payload_persisted_byte_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let payload = b"PK\x03\x04 definitely not an image";
        let (path, kind) =
            classify_and_persist(payload, "download", dir.path(), "Archive.ZIP").expect("persist");

        assert_eq!(
            kind,
            MediaKind::Opaque {
                extension: "zip".into()
            }
        );
        assert_eq!(kind.tag(), "zip");
        assert!(path.ends_with("download.zip"), "got: {}", path.display());
        assert_eq!(std::fs::read(&path).expect("read back"), payload);
    }

    #[test]
    fn opaque_without_extension_gets_bare_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (path, kind) =
            classify_and_persist(b"\x00\x01\x02", "blob", dir.path(), "download").expect("persist");
        assert_eq!(kind.tag(), "");
        assert!(path.ends_with("blob"), "got: {}", path.display());
    }

    #[test]
    fn url_basename_variants() {
        assert_eq!(
            url_basename("https://host/a/b/cat.png").as_deref(),
            Some("cat.png")
        );
        assert_eq!(url_basename("https://host/"), None);
        assert_eq!(url_basename("not a url"), None);
    }
}
