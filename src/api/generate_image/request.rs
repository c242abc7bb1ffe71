// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image generation request wire type

use serde::{Deserialize, Serialize};

use crate::diffusion::request::{DEFAULT_GUIDANCE_SCALE, DEFAULT_STEPS, MAX_STEPS, MIN_STEPS};
use crate::diffusion::{GenerationRequest, ValidationError};

fn default_steps() -> f64 {
    f64::from(DEFAULT_STEPS)
}

fn default_guidance_scale() -> f32 {
    DEFAULT_GUIDANCE_SCALE
}

/// Request body for POST /generate, and each inbound /ws text frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageGenerationRequest {
    /// Text prompt describing the desired image
    pub prompt: String,

    /// Negative prompt to guide away from
    #[serde(default)]
    pub negative_prompt: Option<String>,

    /// Number of inference steps. Any JSON number parses here (`10` and
    /// `10.0` alike) so that negative or fractional values are reported as
    /// validation errors rather than parse errors.
    #[serde(default = "default_steps", alias = "num_inference_steps")]
    pub steps: f64,

    /// Classifier-free guidance scale
    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,
}

impl ImageGenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            steps: f64::from(DEFAULT_STEPS),
            guidance_scale: DEFAULT_GUIDANCE_SCALE,
        }
    }

    /// Check every field constraint and produce the immutable request
    pub fn validate(self) -> Result<GenerationRequest, ValidationError> {
        let steps = whole_steps(self.steps)?;
        GenerationRequest::new(self.prompt, self.negative_prompt, steps, self.guidance_scale)
    }
}

fn whole_steps(steps: f64) -> Result<u32, ValidationError> {
    if steps.fract() != 0.0 {
        return Err(ValidationError::new(
            "steps",
            format!("steps must be a whole number, got {}", steps),
        ));
    }
    if !(0.0..=f64::from(u32::MAX)).contains(&steps) {
        return Err(ValidationError::new(
            "steps",
            format!("steps must be between {} and {}, got {}", MIN_STEPS, MAX_STEPS, steps),
        ));
    }
    Ok(steps as u32)
}
