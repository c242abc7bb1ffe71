// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Validated image generation request
//!
//! `GenerationRequest` is the immutable value the gate, arbiter and
//! pipelines work with. The only way to build one is `GenerationRequest::new`,
//! which enforces every field constraint.

use thiserror::Error;

/// Maximum prompt length in characters
pub const MAX_PROMPT_CHARS: usize = 1000;
/// Inclusive bounds for the number of denoising steps
pub const MIN_STEPS: u32 = 1;
pub const MAX_STEPS: u32 = 100;
/// Inclusive bounds for classifier-free guidance
pub const MIN_GUIDANCE_SCALE: f32 = 1.0;
pub const MAX_GUIDANCE_SCALE: f32 = 20.0;

pub const DEFAULT_STEPS: u32 = 50;
pub const DEFAULT_GUIDANCE_SCALE: f32 = 7.5;

/// A request field that failed validation
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// A validated image generation request
///
/// Fields are private so a value can only exist if it passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    prompt: String,
    negative_prompt: Option<String>,
    steps: u32,
    guidance_scale: f32,
}

impl GenerationRequest {
    pub fn new(
        prompt: impl Into<String>,
        negative_prompt: Option<String>,
        steps: u32,
        guidance_scale: f32,
    ) -> Result<Self, ValidationError> {
        let prompt = prompt.into();
        if prompt.trim().is_empty() {
            return Err(ValidationError::new("prompt", "prompt must not be empty"));
        }
        let prompt_chars = prompt.chars().count();
        if prompt_chars > MAX_PROMPT_CHARS {
            return Err(ValidationError::new(
                "prompt",
                format!(
                    "prompt must be at most {} characters, got {}",
                    MAX_PROMPT_CHARS, prompt_chars
                ),
            ));
        }

        // An empty negative prompt means "none"
        let negative_prompt = negative_prompt.filter(|n| !n.trim().is_empty());
        if let Some(ref negative) = negative_prompt {
            let chars = negative.chars().count();
            if chars > MAX_PROMPT_CHARS {
                return Err(ValidationError::new(
                    "negative_prompt",
                    format!(
                        "negative_prompt must be at most {} characters, got {}",
                        MAX_PROMPT_CHARS, chars
                    ),
                ));
            }
        }

        if !(MIN_STEPS..=MAX_STEPS).contains(&steps) {
            return Err(ValidationError::new(
                "steps",
                format!(
                    "steps must be between {} and {}, got {}",
                    MIN_STEPS, MAX_STEPS, steps
                ),
            ));
        }

        if !guidance_scale.is_finite()
            || !(MIN_GUIDANCE_SCALE..=MAX_GUIDANCE_SCALE).contains(&guidance_scale)
        {
            return Err(ValidationError::new(
                "guidance_scale",
                format!(
                    "guidance_scale must be between {} and {}, got {}",
                    MIN_GUIDANCE_SCALE, MAX_GUIDANCE_SCALE, guidance_scale
                ),
            ));
        }

        Ok(Self {
            prompt,
            negative_prompt,
            steps,
            guidance_scale,
        })
    }

    /// Convenience constructor using the default steps and guidance scale
    pub fn from_prompt(prompt: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(prompt, None, DEFAULT_STEPS, DEFAULT_GUIDANCE_SCALE)
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn negative_prompt(&self) -> Option<&str> {
        self.negative_prompt.as_deref()
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn guidance_scale(&self) -> f32 {
        self.guidance_scale
    }
}
