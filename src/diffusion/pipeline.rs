// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! The generation capability behind the arbiter

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diffusion::artifact::ImageArtifact;
use crate::diffusion::request::GenerationRequest;

/// Where generation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionBackend {
    /// GPU diffusion sidecar
    Cuda,
    /// Local CPU renderer, the slow fallback
    Cpu,
}

impl ExecutionBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionBackend::Cuda => "cuda",
            ExecutionBackend::Cpu => "cpu",
        }
    }
}

impl std::fmt::Display for ExecutionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("backend error: {0}")]
    Backend(String),

    #[error("failed to encode image: {0}")]
    Encoding(String),

    #[error("pipeline panicked: {0}")]
    Panicked(String),
}

/// One loaded image generation model.
///
/// Calls block until the image is ready. An implementation is never asked
/// to run two generations at once; only the arbiter's worker thread holds it.
pub trait ImagePipeline: Send {
    fn generate(&mut self, request: &GenerationRequest) -> Result<ImageArtifact, PipelineError>;
}
