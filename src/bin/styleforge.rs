//! Worker binary for styleforge.
//!
//! A thin shim over the library crate: maps CLI flags to `PipelineConfig`,
//! reads one request mapping from a file or stdin, runs it, and prints the
//! response mapping to stdout. The outer serving framework — whatever queues
//! requests at this process — is expected to invoke exactly this contract.

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use styleforge::{handle, HttpRenderBackend, PipelineConfig, RenderService};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "styleforge", version, about = "Run one style-transfer render job")]
struct Args {
    /// Request JSON file; reads stdin when omitted.
    #[arg(long)]
    request: Option<PathBuf>,

    /// Rendering backend HTTP URL.
    #[arg(long, env = "STYLEFORGE_BACKEND_URL", default_value = "http://127.0.0.1:8188")]
    backend_url: String,

    /// Input staging directory.
    #[arg(long, env = "STYLEFORGE_INPUT_DIR", default_value = "/tmp/inputs")]
    input_dir: PathBuf,

    /// Output staging directory.
    #[arg(long, env = "STYLEFORGE_OUTPUT_DIR", default_value = "/tmp/outputs")]
    output_dir: PathBuf,

    /// Backend scratch directory.
    #[arg(long, env = "STYLEFORGE_TEMP_DIR", default_value = "ComfyUI/temp")]
    backend_temp_dir: PathBuf,

    /// Fetch timeout per input, in seconds.
    #[arg(long, default_value_t = 30)]
    fetch_timeout_secs: u64,

    /// Sampler step count.
    #[arg(long, default_value_t = 20)]
    steps: u32,

    /// Workflow template JSON file; bundled template when omitted.
    #[arg(long)]
    template: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();

    let request: Value = match &args.request {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading request file {}", path.display()))?;
            serde_json::from_str(&text).context("request file is not valid JSON")?
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("reading request from stdin")?;
            serde_json::from_str(&text).context("stdin is not valid JSON")?
        }
    };

    let mut builder = PipelineConfig::builder()
        .backend_url(&args.backend_url)
        .input_dir(&args.input_dir)
        .output_dir(&args.output_dir)
        .backend_temp_dir(&args.backend_temp_dir)
        .fetch_timeout_secs(args.fetch_timeout_secs)
        .steps(args.steps);
    if let Some(path) = &args.template {
        let template = std::fs::read_to_string(path)
            .with_context(|| format!("reading template {}", path.display()))?;
        builder = builder.workflow_template(template);
    }
    let config = builder.build()?;

    let backend = Arc::new(HttpRenderBackend::new(
        config.backend_url.clone(),
        config.poll_interval_ms,
    ));
    let service = RenderService::init(config, backend).await?;

    let response = handle(&service, &request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    service.shutdown().await?;
    Ok(())
}
