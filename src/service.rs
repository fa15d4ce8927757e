//! The job orchestrator: one [`RenderService`] per process, explicit lifecycle.
//!
//! ## Why a service object instead of a global?
//!
//! Backend connection setup is paid once in [`RenderService::init`]; the
//! service is then injected into the request boundary and reused across
//! requests. The explicit `init`/`run_job`/`shutdown` lifecycle keeps the
//! backend mockable in tests instead of living in ambient global state.
//!
//! ## Job sequence
//!
//! `run_job` is strictly sequential: reset workspace, resolve seed, fetch
//! both inputs, resolve the workflow, submit and wait, collect outputs.
//! An internal mutex serializes jobs — the destructive workspace reset
//! assumes exclusive ownership of the three directories, so two interleaved
//! jobs in one process would corrupt each other's inputs and outputs.

use crate::backend::RenderBackend;
use crate::config::PipelineConfig;
use crate::error::StyleForgeError;
use crate::job::JobParams;
use crate::pipeline::{collect, fetch, workflow::WorkflowTemplate};
use rand::Rng;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Long-lived pipeline service constructed once at process start.
pub struct RenderService {
    config: PipelineConfig,
    backend: Arc<dyn RenderBackend>,
    template: WorkflowTemplate,
    http: reqwest::Client,
    /// Serializes `run_job`: the workspace reset is destructive and must
    /// never run concurrently with another job's fetch or collect.
    job_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for RenderService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderService").finish_non_exhaustive()
    }
}

impl RenderService {
    /// Initialize the service: validate the workflow template, create the
    /// workspace directories, and connect to the backend.
    ///
    /// A `SchemaMismatch` here means the template and the code disagree —
    /// the deployment is unhealthy and should not serve traffic.
    pub async fn init(
        config: PipelineConfig,
        backend: Arc<dyn RenderBackend>,
    ) -> Result<Self, StyleForgeError> {
        let template = match &config.workflow_template {
            Some(raw) => WorkflowTemplate::new(raw.clone())?,
            None => WorkflowTemplate::bundled()?,
        };

        for dir in [
            &config.input_dir,
            &config.output_dir,
            &config.backend_temp_dir,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| StyleForgeError::workspace(dir, e))?;
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()
            .map_err(|e| StyleForgeError::Internal(format!("HTTP client build failed: {e}")))?;

        backend.connect().await?;
        info!("Render service initialized");

        Ok(Self {
            config,
            backend,
            template,
            http,
            job_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run one job end to end, returning the collected output file paths.
    ///
    /// Nothing in here is retried; any step failure aborts the job and
    /// surfaces as a distinguishable error to the caller.
    pub async fn run_job(&self, params: &JobParams) -> Result<Vec<PathBuf>, StyleForgeError> {
        let _guard = self.job_lock.lock().await;

        // 1. Reset: nothing from a prior job — artifact, queued task, or
        // partial input — may survive into this one.
        self.reset_workspace().await?;

        // 2. Seed resolution.
        let seed = resolve_seed(params.seed);

        // 3. Fetch inputs. Either failure aborts the job.
        let style = fetch::fetch(
            &self.http,
            &params.style_image_url,
            &self.config.style_image_name,
            &self.config.input_dir,
            self.config.fetch_timeout_secs,
        )
        .await?;
        debug!(kind = style.kind.tag(), original = %style.original_name, "Style input staged");

        let structure = fetch::fetch(
            &self.http,
            &params.structure_image_url,
            &self.config.structure_image_name,
            &self.config.input_dir,
            self.config.fetch_timeout_secs,
        )
        .await?;
        debug!(kind = structure.kind.tag(), original = %structure.original_name, "Structure input staged");

        // 4. Parameterize a fresh copy of the template.
        let document = self.template.resolve(params, seed, &self.config)?;

        // 5. Submit and wait.
        let handle = self.backend.load_workflow(&document).await?;
        self.backend.run_workflow(&handle).await?;

        // 6. Collect.
        let files = collect::collect_output_files(&self.config.output_dir)?;
        info!("Job produced {} output file(s)", files.len());
        Ok(files)
    }

    /// Clear the backend queue and recreate the three workspace directories
    /// empty. Idempotent; called at the start of every job.
    pub async fn reset_workspace(&self) -> Result<(), StyleForgeError> {
        self.backend.clear_queue().await?;

        for dir in [
            &self.config.input_dir,
            &self.config.output_dir,
            &self.config.backend_temp_dir,
        ] {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StyleForgeError::workspace(dir, e)),
            }
            std::fs::create_dir_all(dir).map_err(|e| StyleForgeError::workspace(dir, e))?;
        }
        debug!("Workspace reset");
        Ok(())
    }

    /// Release backend state. Call once when the process is going away.
    pub async fn shutdown(&self) -> Result<(), StyleForgeError> {
        self.backend.clear_queue().await?;
        info!("Render service shut down");
        Ok(())
    }
}

/// Use the requested seed, or draw one uniformly from the full `u32` range.
fn resolve_seed(requested: Option<u32>) -> u32 {
    match requested {
        Some(seed) => seed,
        None => {
            let seed = rand::rng().random_range(0..=u32::MAX);
            info!("Random seed set to: {seed}");
            seed
        }
    }
}
