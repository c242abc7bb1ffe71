// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! CPU fallback pipeline
//!
//! Renders a deterministic abstract image from the request: the same prompt
//! and parameters always produce the same PNG. Each step adds one layer of
//! interference pattern, so cost grows with `steps` like a real sampler.

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::diffusion::artifact::ImageArtifact;
use crate::diffusion::pipeline::{ImagePipeline, PipelineError};
use crate::diffusion::request::GenerationRequest;

/// Smallest edge the renderer will produce
pub const MIN_EDGE: u32 = 64;
/// Upper bound on pattern layers regardless of step count
const MAX_LAYERS: u32 = 24;

pub struct ProceduralPipeline {
    edge: u32,
}

impl ProceduralPipeline {
    pub fn new(edge: u32) -> Self {
        Self {
            edge: edge.max(MIN_EDGE),
        }
    }

    pub fn edge(&self) -> u32 {
        self.edge
    }

    fn seed(request: &GenerationRequest) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(request.prompt().as_bytes());
        hasher.update([0u8]);
        if let Some(neg) = request.negative_prompt() {
            hasher.update(neg.as_bytes());
        }
        hasher.update(request.steps().to_le_bytes());
        hasher.update(request.guidance_scale().to_le_bytes());
        hasher.finalize().into()
    }

    fn render(&self, request: &GenerationRequest) -> RgbImage {
        let seed = Self::seed(request);
        let layers = request.steps().clamp(1, MAX_LAYERS);
        // Higher guidance pushes the image towards saturated extremes
        let contrast = request.guidance_scale() / 7.5;

        let waves: Vec<(f32, f32, f32)> = (0..layers as usize)
            .map(|i| {
                let a = seed[i % 32] as f32;
                let b = seed[(i * 7 + 3) % 32] as f32;
                let c = seed[(i * 13 + 5) % 32] as f32;
                (1.0 + a / 32.0, 1.0 + b / 32.0, c / 255.0 * std::f32::consts::TAU)
            })
            .collect();

        let palette = [
            [seed[0], seed[1], seed[2]],
            [seed[3], seed[4], seed[5]],
            [seed[6], seed[7], seed[8]],
        ];

        let edge = self.edge as f32;
        RgbImage::from_fn(self.edge, self.edge, |x, y| {
            let u = x as f32 / edge;
            let v = y as f32 / edge;
            let mut value = 0.0f32;
            for &(fx, fy, phase) in &waves {
                value += (u * fx * std::f32::consts::TAU + phase).sin()
                    * (v * fy * std::f32::consts::TAU - phase).cos();
            }
            let t = ((value / layers as f32) * contrast * 0.5 + 0.5).clamp(0.0, 1.0);
            Rgb(blend(&palette, t))
        })
    }
}

fn blend(palette: &[[u8; 3]; 3], t: f32) -> [u8; 3] {
    let (from, to, local) = if t < 0.5 {
        (palette[0], palette[1], t * 2.0)
    } else {
        (palette[1], palette[2], (t - 0.5) * 2.0)
    };
    let mut out = [0u8; 3];
    for i in 0..3 {
        out[i] = (from[i] as f32 + (to[i] as f32 - from[i] as f32) * local).round() as u8;
    }
    out
}

impl ImagePipeline for ProceduralPipeline {
    fn generate(&mut self, request: &GenerationRequest) -> Result<ImageArtifact, PipelineError> {
        let frame = self.render(request);
        let mut png = Vec::new();
        frame
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| PipelineError::Encoding(e.to_string()))?;
        debug!(edge = self.edge, bytes = png.len(), "Rendered procedural frame");
        Ok(ImageArtifact::png(png))
    }
}
