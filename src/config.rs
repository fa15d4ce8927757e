//! Configuration for the render pipeline.
//!
//! All pipeline behaviour is controlled through [`PipelineConfig`], built via
//! its [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share the config across the service and the CLI, and to diff
//! two deployments to understand why their outputs differ.
//!
//! Sampler settings (step count, guidance scale, sampler id, checkpoint) live
//! here rather than in the per-job parameters: they are deployment decisions
//! pinned together with the workflow template version, not request inputs.

use crate::error::StyleForgeError;
use std::path::PathBuf;

/// Identifying User-Agent sent with every input fetch.
pub const USER_AGENT: &str = concat!("styleforge/", env!("CARGO_PKG_VERSION"));

/// Configuration for a [`crate::service::RenderService`].
///
/// Built via [`PipelineConfig::builder()`] or [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use styleforge::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .backend_url("http://127.0.0.1:8188")
///     .steps(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base HTTP URL of the rendering backend. Default: `http://127.0.0.1:8188`.
    pub backend_url: String,

    /// Input staging directory. Default: `/tmp/inputs`.
    ///
    /// Exclusively owned by the service; the backend never writes here.
    pub input_dir: PathBuf,

    /// Output staging directory the backend renders into. Default: `/tmp/outputs`.
    pub output_dir: PathBuf,

    /// Scratch directory the backend uses for intermediates. Default: `ComfyUI/temp`.
    pub backend_temp_dir: PathBuf,

    /// Timeout budget for each input fetch, in seconds. Default: 30.
    ///
    /// A single timed-out or failed fetch fails the whole job; there is no
    /// retry at this layer.
    pub fetch_timeout_secs: u64,

    /// Sampler step count written into the workflow. Default: 20.
    pub steps: u32,

    /// Classifier-free guidance scale written into the workflow. Default: 8.0.
    pub guidance_scale: f64,

    /// Sampler algorithm identifier. Default: `dpmpp_2m_sde_gpu`.
    pub sampler_name: String,

    /// Checkpoint file the workflow loads. Default: `albedobaseXL_v21.safetensors`.
    ///
    /// Must match a checkpoint present on the backend; the backend is the
    /// authority and rejects the workflow otherwise.
    pub checkpoint: String,

    /// Safety guard always prepended to the user's negative prompt.
    /// Default: `nsfw, nude`.
    pub negative_prompt_guard: String,

    /// Staging filename for the style image. Default: `image.png`.
    ///
    /// The workflow template's style `LoadImage` node addresses this name, so
    /// the two must stay in sync.
    pub style_image_name: String,

    /// Staging filename for the structure image. Default: `structure.png`.
    pub structure_image_name: String,

    /// Workflow template JSON text. `None` uses the bundled asset.
    ///
    /// Whatever template is supplied must carry every slot in
    /// [`crate::pipeline::workflow::slots::ALL`]; service init fails with
    /// `SchemaMismatch` otherwise.
    pub workflow_template: Option<String>,

    /// Backend completion-poll interval in milliseconds. Default: 1000.
    pub poll_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:8188".to_string(),
            input_dir: PathBuf::from("/tmp/inputs"),
            output_dir: PathBuf::from("/tmp/outputs"),
            backend_temp_dir: PathBuf::from("ComfyUI/temp"),
            fetch_timeout_secs: 30,
            steps: 20,
            guidance_scale: 8.0,
            sampler_name: "dpmpp_2m_sde_gpu".to_string(),
            checkpoint: "albedobaseXL_v21.safetensors".to_string(),
            negative_prompt_guard: "nsfw, nude".to_string(),
            style_image_name: "image.png".to_string(),
            structure_image_name: "structure.png".to_string(),
            workflow_template: None,
            poll_interval_ms: 1000,
        }
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn backend_url(mut self, url: impl Into<String>) -> Self {
        self.config.backend_url = url.into();
        self
    }

    pub fn input_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.input_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn backend_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.backend_temp_dir = dir.into();
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn steps(mut self, steps: u32) -> Self {
        self.config.steps = steps;
        self
    }

    pub fn guidance_scale(mut self, cfg: f64) -> Self {
        self.config.guidance_scale = cfg;
        self
    }

    pub fn sampler_name(mut self, name: impl Into<String>) -> Self {
        self.config.sampler_name = name.into();
        self
    }

    pub fn checkpoint(mut self, name: impl Into<String>) -> Self {
        self.config.checkpoint = name.into();
        self
    }

    pub fn negative_prompt_guard(mut self, guard: impl Into<String>) -> Self {
        self.config.negative_prompt_guard = guard.into();
        self
    }

    pub fn workflow_template(mut self, json: impl Into<String>) -> Self {
        self.config.workflow_template = Some(json.into());
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms.max(10);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, StyleForgeError> {
        let c = &self.config;
        if c.fetch_timeout_secs == 0 {
            return Err(StyleForgeError::InvalidConfig(
                "fetch timeout must be ≥ 1 second".into(),
            ));
        }
        if c.steps == 0 {
            return Err(StyleForgeError::InvalidConfig("steps must be ≥ 1".into()));
        }
        if c.backend_url.is_empty() {
            return Err(StyleForgeError::InvalidConfig(
                "backend URL must not be empty".into(),
            ));
        }
        // The three workspace directories are deleted and recreated per job;
        // refusing overlap here prevents a reset from destroying its own input.
        if c.input_dir == c.output_dir
            || c.input_dir == c.backend_temp_dir
            || c.output_dir == c.backend_temp_dir
        {
            return Err(StyleForgeError::InvalidConfig(
                "workspace directories must be distinct".into(),
            ));
        }
        Ok(self.config)
    }
}
