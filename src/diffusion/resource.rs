// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! The single long-lived inference resource
//!
//! Built once at startup and then moved into the arbiter's worker thread,
//! which is the only code that ever calls `generate`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::diffusion::artifact::ImageArtifact;
use crate::diffusion::client::SidecarPipeline;
use crate::diffusion::pipeline::{ExecutionBackend, ImagePipeline, PipelineError};
use crate::diffusion::procedural::ProceduralPipeline;
use crate::diffusion::request::GenerationRequest;

#[derive(Debug, Clone)]
pub struct ResourceConfig {
    pub model_id: String,
    pub device: ExecutionBackend,
    pub diffusion_endpoint: String,
    pub max_image_size: u32,
}

/// What is actually running, reported by /health
#[derive(Debug, Clone, Serialize)]
pub struct ResourceInfo {
    pub model_id: String,
    pub backend: ExecutionBackend,
    pub requested_backend: ExecutionBackend,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

pub struct InferenceResource {
    pipeline: Box<dyn ImagePipeline>,
    info: ResourceInfo,
}

impl InferenceResource {
    /// Wrap an already-loaded pipeline
    pub fn new(
        pipeline: Box<dyn ImagePipeline>,
        model_id: impl Into<String>,
        backend: ExecutionBackend,
    ) -> Self {
        Self {
            pipeline,
            info: ResourceInfo {
                model_id: model_id.into(),
                backend,
                requested_backend: backend,
                degraded: false,
                fallback_reason: None,
            },
        }
    }

    /// Load the configured backend, falling back to the CPU renderer if the
    /// accelerated one cannot be brought up. Never fails.
    pub async fn initialize(config: &ResourceConfig) -> Self {
        let start = Instant::now();
        match config.device {
            ExecutionBackend::Cuda => {
                match SidecarPipeline::connect(
                    &config.diffusion_endpoint,
                    &config.model_id,
                    config.max_image_size,
                )
                .await
                {
                    Ok(pipeline) => {
                        info!(
                            model_id = %config.model_id,
                            elapsed_ms = start.elapsed().as_millis() as u64,
                            "Inference resource ready on accelerated backend"
                        );
                        Self::new(Box::new(pipeline), &config.model_id, ExecutionBackend::Cuda)
                    }
                    Err(e) => {
                        warn!(
                            model_id = %config.model_id,
                            error = %format!("{:#}", e),
                            "Accelerated backend unavailable, falling back to CPU"
                        );
                        let mut resource = Self::cpu(config);
                        resource.info.requested_backend = ExecutionBackend::Cuda;
                        resource.info.degraded = true;
                        resource.info.fallback_reason = Some(format!("{:#}", e));
                        resource
                    }
                }
            }
            ExecutionBackend::Cpu => {
                info!(model_id = %config.model_id, "Inference resource ready on CPU backend");
                Self::cpu(config)
            }
        }
    }

    fn cpu(config: &ResourceConfig) -> Self {
        Self::new(
            Box::new(ProceduralPipeline::new(config.max_image_size)),
            &config.model_id,
            ExecutionBackend::Cpu,
        )
    }

    pub fn info(&self) -> &ResourceInfo {
        &self.info
    }

    /// Run one generation. Panics inside the pipeline become errors so the
    /// caller's thread survives.
    pub fn generate(&mut self, request: &GenerationRequest) -> Result<ImageArtifact, PipelineError> {
        let pipeline = &mut self.pipeline;
        match catch_unwind(AssertUnwindSafe(|| pipeline.generate(request))) {
            Ok(result) => result,
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(PipelineError::Panicked(message))
            }
        }
    }
}
