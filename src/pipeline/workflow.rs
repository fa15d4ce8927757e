//! Workflow template loading and parameterization.
//!
//! The workflow document is an opaque, addressable-by-key graph the backend
//! executes. The parameterizer writes job values into a fixed,
//! version-pinned set of [`Slot`] addresses; every address is declared as a
//! named constant in [`slots`] and validated once when the template is
//! loaded, so template/code drift surfaces at service init as
//! `SchemaMismatch` instead of as an unchecked key lookup mid-job.
//!
//! No range validation happens here — out-of-range values pass through to
//! the backend, which is the authority on acceptable ranges.
//!
//! The template text is kept raw and re-parsed for every job so per-job
//! mutations never leak into the next run.

use crate::config::PipelineConfig;
use crate::error::StyleForgeError;
use crate::job::JobParams;
use serde_json::Value;

/// The bundled style-transfer-with-structure template.
pub const DEFAULT_TEMPLATE: &str =
    include_str!("../../assets/style-transfer-with-structure-api.json");

/// A fixed, named writable location inside the workflow document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Node identifier within the graph.
    pub node: &'static str,
    /// Input key on that node.
    pub input: &'static str,
}

/// Every slot the parameterizer touches, pinned to the template version the
/// crate ships with.
pub mod slots {
    use super::Slot;

    pub const SAMPLER_STEPS: Slot = Slot { node: "3", input: "steps" };
    pub const SAMPLER_CFG: Slot = Slot { node: "3", input: "cfg" };
    pub const SAMPLER_NAME: Slot = Slot { node: "3", input: "sampler_name" };
    pub const SAMPLER_SEED: Slot = Slot { node: "3", input: "seed" };
    pub const SAMPLER_DENOISE: Slot = Slot { node: "3", input: "denoise" };
    pub const CHECKPOINT_NAME: Slot = Slot { node: "2", input: "ckpt_name" };
    pub const POSITIVE_PROMPT: Slot = Slot { node: "6", input: "text" };
    pub const NEGATIVE_PROMPT: Slot = Slot { node: "7", input: "text" };
    pub const STRUCTURE_STRENGTH: Slot = Slot { node: "18", input: "strength" };
    pub const BATCH_AMOUNT: Slot = Slot { node: "24", input: "amount" };

    /// Complete slot set, used for load-time validation.
    pub const ALL: [Slot; 10] = [
        SAMPLER_STEPS,
        SAMPLER_CFG,
        SAMPLER_NAME,
        SAMPLER_SEED,
        SAMPLER_DENOISE,
        CHECKPOINT_NAME,
        POSITIVE_PROMPT,
        NEGATIVE_PROMPT,
        STRUCTURE_STRENGTH,
        BATCH_AMOUNT,
    ];
}

/// A validated workflow template, ready to be resolved per job.
#[derive(Debug, Clone)]
pub struct WorkflowTemplate {
    raw: String,
}

impl WorkflowTemplate {
    /// Parse and validate template text.
    ///
    /// Fails with `SchemaMismatch` if any slot in [`slots::ALL`] is absent.
    pub fn new(raw: impl Into<String>) -> Result<Self, StyleForgeError> {
        let raw = raw.into();
        let document: Value = serde_json::from_str(&raw)?;
        for slot in slots::ALL {
            slot_target(&document, slot).ok_or_else(|| StyleForgeError::SchemaMismatch {
                node: slot.node.to_string(),
                input: slot.input.to_string(),
            })?;
        }
        Ok(Self { raw })
    }

    /// The bundled template, validated.
    pub fn bundled() -> Result<Self, StyleForgeError> {
        Self::new(DEFAULT_TEMPLATE)
    }

    /// Produce a fully-resolved document for one job.
    ///
    /// Parses the raw text fresh (the per-job deep copy) and writes every
    /// slot. `seed` is the already-resolved seed, never the job's optional
    /// one. The returned document is consumed by submission; the template
    /// itself is never mutated.
    pub fn resolve(
        &self,
        params: &JobParams,
        seed: u32,
        config: &PipelineConfig,
    ) -> Result<Value, StyleForgeError> {
        let mut document: Value = serde_json::from_str(&self.raw)?;

        write_slot(&mut document, slots::SAMPLER_STEPS, config.steps.into())?;
        write_slot(&mut document, slots::SAMPLER_CFG, json_f64(config.guidance_scale))?;
        write_slot(
            &mut document,
            slots::SAMPLER_NAME,
            Value::String(config.sampler_name.clone()),
        )?;
        write_slot(&mut document, slots::SAMPLER_SEED, seed.into())?;
        write_slot(
            &mut document,
            slots::CHECKPOINT_NAME,
            Value::String(config.checkpoint.clone()),
        )?;
        write_slot(
            &mut document,
            slots::POSITIVE_PROMPT,
            Value::String(params.prompt.clone()),
        )?;
        write_slot(
            &mut document,
            slots::NEGATIVE_PROMPT,
            Value::String(format!(
                "{}, {}",
                config.negative_prompt_guard, params.negative_prompt
            )),
        )?;

        // Denoise drives both the sampler and the structure conditioning
        // strength; depth strength passes through untouched by this template
        // version.
        write_slot(
            &mut document,
            slots::SAMPLER_DENOISE,
            json_f64(params.structure_denoising_strength),
        )?;
        write_slot(
            &mut document,
            slots::STRUCTURE_STRENGTH,
            json_f64(params.structure_denoising_strength),
        )?;
        write_slot(&mut document, slots::BATCH_AMOUNT, params.number_of_images.into())?;

        Ok(document)
    }
}

/// The mutable `inputs` entry a slot addresses, if present.
fn slot_target<'a>(document: &'a Value, slot: Slot) -> Option<&'a Value> {
    document.get(slot.node)?.get("inputs")?.get(slot.input)
}

fn write_slot(document: &mut Value, slot: Slot, value: Value) -> Result<(), StyleForgeError> {
    let target = document
        .get_mut(slot.node)
        .and_then(|node| node.get_mut("inputs"))
        .and_then(|inputs| inputs.get_mut(slot.input))
        .ok_or_else(|| StyleForgeError::SchemaMismatch {
            node: slot.node.to_string(),
            input: slot.input.to_string(),
        })?;
    *target = value;
    Ok(())
}

fn json_f64(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
