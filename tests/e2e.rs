//! End-to-end tests for the request → response pipeline.
//!
//! Everything here is hermetic: source images are served from a throwaway
//! local HTTP listener and the rendering backend is a mock that writes
//! files into the output directory. No GPU, no network, no live backend.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use styleforge::{
    handle, BackendError, JobParams, PipelineConfig, RenderBackend, RenderService, StyleForgeError,
    WorkflowHandle,
};

// ── Local HTTP fixture ───────────────────────────────────────────────────

/// Serve `body` on a local port, answering every connection until the test
/// process exits. Returns the URL of `path`.
fn serve_bytes(body: Vec<u8>, path: &str, content_disposition: Option<&str>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture listener");
    let port = listener.local_addr().expect("local addr").port();
    let disposition_header = content_disposition
        .map(|value| format!("Content-Disposition: {value}\r\n"))
        .unwrap_or_default();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            // Drain the request head; we answer every path identically.
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
                body.len(),
                disposition_header
            );
            let _ = stream.write_all(head.as_bytes());
            let _ = stream.write_all(&body);
        }
    });

    format!("http://127.0.0.1:{port}{path}")
}

fn serve_404() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind fixture listener");
    let port = listener.local_addr().expect("local addr").port();
    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(
                b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            );
        }
    });
    format!("http://127.0.0.1:{port}/missing.png")
}

fn jpeg_fixture() -> Vec<u8> {
    let img = RgbImage::from_pixel(16, 16, Rgb([250, 80, 10]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .expect("jpeg encode");
    buf
}

// ── Mock backend ─────────────────────────────────────────────────────────

/// Backend double: records the submitted document and, on run, writes as
/// many PNGs into the output directory as the document's batch slot asks
/// for, plus one non-image log file.
struct MockBackend {
    output_dir: PathBuf,
    submitted: Mutex<Option<Value>>,
    fail_with: Option<fn() -> BackendError>,
}

impl MockBackend {
    fn new(output_dir: &Path) -> Self {
        Self {
            output_dir: output_dir.to_path_buf(),
            submitted: Mutex::new(None),
            fail_with: None,
        }
    }

    fn failing(output_dir: &Path, fail_with: fn() -> BackendError) -> Self {
        Self {
            fail_with: Some(fail_with),
            ..Self::new(output_dir)
        }
    }

    fn submitted_document(&self) -> Option<Value> {
        self.submitted.lock().expect("not poisoned").clone()
    }
}

#[async_trait]
impl RenderBackend for MockBackend {
    async fn connect(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn load_workflow(&self, document: &Value) -> Result<WorkflowHandle, BackendError> {
        *self.submitted.lock().expect("not poisoned") = Some(document.clone());
        Ok(WorkflowHandle { id: "mock-1".into() })
    }

    async fn run_workflow(&self, _handle: &WorkflowHandle) -> Result<(), BackendError> {
        if let Some(fail) = self.fail_with {
            return Err(fail());
        }
        let document = self.submitted_document().expect("load before run");
        let amount = document["24"]["inputs"]["amount"].as_u64().unwrap_or(1);
        for i in 0..amount {
            let img = RgbImage::from_pixel(8, 8, Rgb([i as u8 * 40, 128, 64]));
            img.save_with_format(
                self.output_dir.join(format!("styleforge_{i:05}.png")),
                ImageFormat::Png,
            )
            .map_err(|e| BackendError::Execution(e.to_string()))?;
        }
        std::fs::write(self.output_dir.join("render.log"), "steps=20 done")
            .map_err(|e| BackendError::Execution(e.to_string()))?;
        Ok(())
    }

    async fn clear_queue(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

fn workspace_config(root: &Path) -> PipelineConfig {
    PipelineConfig::builder()
        .input_dir(root.join("inputs"))
        .output_dir(root.join("outputs"))
        .backend_temp_dir(root.join("temp"))
        .build()
        .expect("valid config")
}

async fn service_with(
    root: &Path,
    backend: Arc<MockBackend>,
) -> RenderService {
    RenderService::init(workspace_config(root), backend)
        .await
        .expect("service init")
}

fn valid_request(style_url: &str, structure_url: &str) -> Value {
    json!({
        "input": {
            "style_image_url": style_url,
            "structure_image_url": structure_url,
            "prompt": "a cat",
        }
    })
}

fn assert_is_png_b64(encoded: &str) {
    let bytes = STANDARD.decode(encoded).expect("valid base64");
    assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n", "payload entries must be PNG");
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn default_request_yields_one_png_and_time() {
    let root = tempfile::tempdir().expect("tempdir");
    let style_url = serve_bytes(jpeg_fixture(), "/style.jpg", None);
    let structure_url = serve_bytes(jpeg_fixture(), "/structure.jpg", None);

    let backend = Arc::new(MockBackend::new(&root.path().join("outputs")));
    let service = service_with(root.path(), Arc::clone(&backend)).await;

    let response = handle(&service, &valid_request(&style_url, &structure_url)).await;

    let images = response["images_base64"].as_array().expect("images array");
    assert_eq!(images.len(), 1, "default number_of_images is 1; got {response}");
    assert_is_png_b64(images[0].as_str().expect("string entry"));

    let time = response["time"].as_f64().expect("time present");
    assert!(time >= 0.0);
    assert!(response.get("error").is_none());

    // The mock's non-image log file must not leak into the payload.
    assert_eq!(images.len(), 1);
}

#[tokio::test]
async fn number_of_images_controls_payload_size() {
    let root = tempfile::tempdir().expect("tempdir");
    let style_url = serve_bytes(jpeg_fixture(), "/style.jpg", None);
    let structure_url = serve_bytes(jpeg_fixture(), "/structure.jpg", None);

    let backend = Arc::new(MockBackend::new(&root.path().join("outputs")));
    let service = service_with(root.path(), Arc::clone(&backend)).await;

    let mut request = valid_request(&style_url, &structure_url);
    request["input"]["number_of_images"] = json!(3);
    let response = handle(&service, &request).await;

    assert_eq!(
        response["images_base64"].as_array().expect("array").len(),
        3,
        "got {response}"
    );
}

#[tokio::test]
async fn explicit_seed_reaches_the_submitted_document() {
    let root = tempfile::tempdir().expect("tempdir");
    let style_url = serve_bytes(jpeg_fixture(), "/style.jpg", None);
    let structure_url = serve_bytes(jpeg_fixture(), "/structure.jpg", None);

    let backend = Arc::new(MockBackend::new(&root.path().join("outputs")));
    let service = service_with(root.path(), Arc::clone(&backend)).await;

    let mut request = valid_request(&style_url, &structure_url);
    request["input"]["seed"] = json!(424242);
    let response = handle(&service, &request).await;
    assert!(response.get("error").is_none(), "got {response}");

    let document = backend.submitted_document().expect("document submitted");
    assert_eq!(document["3"]["inputs"]["seed"], 424242);
    // Staged input names flow into the document's loader nodes untouched.
    assert_eq!(document["1"]["inputs"]["image"], "image.png");
    assert_eq!(document["12"]["inputs"]["image"], "structure.png");
}

#[tokio::test]
async fn missing_prompt_is_exactly_the_documented_error() {
    let root = tempfile::tempdir().expect("tempdir");
    let backend = Arc::new(MockBackend::new(&root.path().join("outputs")));
    let service = service_with(root.path(), Arc::clone(&backend)).await;

    let response = handle(
        &service,
        &json!({
            "input": {
                "style_image_url": "http://127.0.0.1:1/s.png",
                "structure_image_url": "http://127.0.0.1:1/t.png",
            }
        }),
    )
    .await;

    assert_eq!(response, json!({ "error": "'prompt' is required" }));
}

#[tokio::test]
async fn backend_oom_maps_to_actionable_guidance() {
    let root = tempfile::tempdir().expect("tempdir");
    let style_url = serve_bytes(jpeg_fixture(), "/style.jpg", None);
    let structure_url = serve_bytes(jpeg_fixture(), "/structure.jpg", None);

    let backend = Arc::new(MockBackend::failing(&root.path().join("outputs"), || {
        BackendError::ResourceExhausted("CUDA out of memory. Tried to allocate 20.00 GiB".into())
    }));
    let service = service_with(root.path(), Arc::clone(&backend)).await;

    let response = handle(&service, &valid_request(&style_url, &structure_url)).await;
    let message = response["error"].as_str().expect("error string");
    assert!(message.contains("steps"), "got: {message}");
    assert!(message.contains("image size"), "got: {message}");
    assert!(!message.contains("CUDA"), "raw backend text leaked: {message}");
}

#[tokio::test]
async fn failed_fetch_aborts_the_job() {
    let root = tempfile::tempdir().expect("tempdir");
    let style_url = serve_404();
    let structure_url = serve_bytes(jpeg_fixture(), "/structure.jpg", None);

    let backend = Arc::new(MockBackend::new(&root.path().join("outputs")));
    let service = service_with(root.path(), Arc::clone(&backend)).await;

    let response = handle(&service, &valid_request(&style_url, &structure_url)).await;
    let message = response["error"].as_str().expect("error string");
    assert!(message.contains("404"), "got: {message}");
    assert!(
        backend.submitted_document().is_none(),
        "nothing may reach the backend after a failed fetch"
    );
}

#[tokio::test]
async fn stale_artifacts_never_leak_between_jobs() {
    let root = tempfile::tempdir().expect("tempdir");
    let style_url = serve_bytes(jpeg_fixture(), "/style.jpg", None);
    let structure_url = serve_bytes(jpeg_fixture(), "/structure.jpg", None);

    let backend = Arc::new(MockBackend::new(&root.path().join("outputs")));
    let service = service_with(root.path(), Arc::clone(&backend)).await;

    // A crashed previous job left debris in all three directories.
    let config = service.config().clone();
    RgbImage::from_pixel(8, 8, Rgb([1, 1, 1]))
        .save_with_format(config.output_dir.join("stale.png"), ImageFormat::Png)
        .expect("stale output");
    std::fs::write(config.input_dir.join("stale-input.png"), b"old").expect("stale input");
    std::fs::write(config.backend_temp_dir.join("scratch.bin"), b"old").expect("stale temp");

    let response = handle(&service, &valid_request(&style_url, &structure_url)).await;

    // Only the fresh render shows up, not the stale PNG.
    assert_eq!(
        response["images_base64"].as_array().expect("array").len(),
        1,
        "got {response}"
    );
    assert!(!config.input_dir.join("stale-input.png").exists());
    assert!(!config.backend_temp_dir.join("scratch.bin").exists());
}

#[tokio::test]
async fn content_disposition_names_opaque_downloads() {
    // Exercised through the library surface rather than the handler: the
    // fetcher is the component under test here.
    let root = tempfile::tempdir().expect("tempdir");
    let url = serve_bytes(
        b"PK\x03\x04 not an image".to_vec(),
        "/artifact",
        Some(r#"attachment; filename="bundle.zip""#),
    );

    let client = reqwest::Client::new();
    let fetched = styleforge::pipeline::fetch::fetch(&client, &url, "payload", root.path(), 30)
        .await
        .expect("fetch succeeds");

    assert_eq!(fetched.original_name, "bundle.zip");
    assert_eq!(fetched.kind.tag(), "zip");
    assert!(fetched.path.ends_with("payload.zip"));
}

#[tokio::test]
async fn run_job_returns_collected_paths_directly() {
    let root = tempfile::tempdir().expect("tempdir");
    let style_url = serve_bytes(jpeg_fixture(), "/style.jpg", None);
    let structure_url = serve_bytes(jpeg_fixture(), "/structure.jpg", None);

    let backend = Arc::new(MockBackend::new(&root.path().join("outputs")));
    let service = service_with(root.path(), Arc::clone(&backend)).await;

    let mut params = JobParams::new(style_url, structure_url, "a cat");
    params.number_of_images = 2;
    params.seed = Some(7);

    let files = service.run_job(&params).await.expect("job succeeds");
    // Two renders plus the mock's log file; the encoder, not the collector,
    // filters non-images.
    assert_eq!(files.len(), 3);
    assert!(files.iter().all(|p| p.starts_with(&service.config().output_dir)));
}

#[tokio::test]
async fn schema_mismatch_at_init_names_the_missing_slot() {
    let root = tempfile::tempdir().expect("tempdir");
    let mut template: Value =
        serde_json::from_str(styleforge::pipeline::workflow::DEFAULT_TEMPLATE).expect("parse");
    template.as_object_mut().expect("object").remove("7");

    let config = PipelineConfig::builder()
        .input_dir(root.path().join("inputs"))
        .output_dir(root.path().join("outputs"))
        .backend_temp_dir(root.path().join("temp"))
        .workflow_template(template.to_string())
        .build()
        .expect("valid config");

    let backend = Arc::new(MockBackend::new(&root.path().join("outputs")));
    let err = RenderService::init(config, backend).await.unwrap_err();
    assert!(
        matches!(&err, StyleForgeError::SchemaMismatch { node, .. } if node == "7"),
        "got: {err}"
    );
}
