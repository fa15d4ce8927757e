//! Job parameters: the immutable input to one pipeline run.

/// Largest seed the request handler hands out by default (`i32::MAX`).
///
/// The orchestrator's own fallback draws from the full `u32` range instead;
/// see [`crate::service::RenderService::run_job`].
pub const MAX_SEED: u32 = i32::MAX as u32;

/// Typed parameters for a single render job.
///
/// Constructed once per request, never mutated, discarded when the run
/// completes. Optional-field defaults match the request contract:
/// empty negative prompt, one image, depth strength 1.0, denoise 0.65,
/// no fixed seed.
#[derive(Debug, Clone)]
pub struct JobParams {
    /// URL of the style reference image.
    pub style_image_url: String,
    /// URL of the structure reference image.
    pub structure_image_url: String,
    /// Positive prompt text.
    pub prompt: String,
    /// Negative prompt text; the safety guard is prepended at parameterize time.
    pub negative_prompt: String,
    /// How many images to render.
    pub number_of_images: u32,
    /// Strength of the structure depth conditioning, in [0, 1].
    pub structure_depth_strength: f64,
    /// Sampler denoise strength, in [0, 1]. Also drives the structure
    /// conditioning strength slot.
    pub structure_denoising_strength: f64,
    /// Fixed seed; `None` means the orchestrator draws one per job.
    pub seed: Option<u32>,
}

impl JobParams {
    /// Build params for the required fields, defaulting everything else.
    pub fn new(
        style_image_url: impl Into<String>,
        structure_image_url: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            style_image_url: style_image_url.into(),
            structure_image_url: structure_image_url.into(),
            prompt: prompt.into(),
            negative_prompt: String::new(),
            number_of_images: 1,
            structure_depth_strength: 1.0,
            structure_denoising_strength: 0.65,
            seed: None,
        }
    }
}
