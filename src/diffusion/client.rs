// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! SGLang Diffusion sidecar client for image generation via OpenAI-compatible API

use anyhow::Result;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::diffusion::artifact::{ImageArtifact, PNG_MIME_TYPE};
use crate::diffusion::pipeline::{ImagePipeline, PipelineError};
use crate::diffusion::request::GenerationRequest;

/// Allowed square output sizes for the sidecar
pub const ALLOWED_EDGES: &[u32] = &[256, 512, 768, 1024];

/// Largest allowed square size not above `max_edge`
pub fn sidecar_size(max_edge: u32) -> String {
    let edge = ALLOWED_EDGES
        .iter()
        .copied()
        .filter(|&e| e <= max_edge)
        .max()
        .unwrap_or(ALLOWED_EDGES[0]);
    format!("{}x{}", edge, edge)
}

/// Client for calling an SGLang Diffusion sidecar via OpenAI-compatible API
pub struct DiffusionClient {
    client: Client,
    endpoint: String,
    model_name: String,
}

// --- OpenAI-compatible response types ---

#[derive(Debug, Deserialize)]
pub struct OpenAIImageResponse {
    pub data: Vec<OpenAIImageData>,
}

#[derive(Debug, Deserialize)]
pub struct OpenAIImageData {
    pub b64_json: Option<String>,
    pub revised_prompt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIModelList {
    data: Vec<OpenAIModelEntry>,
}

#[derive(Debug, Deserialize)]
struct OpenAIModelEntry {
    id: String,
}

impl DiffusionClient {
    /// Create a new DiffusionClient
    pub fn new(endpoint: &str, model_name: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        let endpoint = endpoint.trim_end_matches('/').to_string();
        info!(
            "Diffusion client configured: endpoint={}, model={}",
            endpoint, model_name
        );

        Ok(Self {
            client,
            endpoint,
            model_name: model_name.to_string(),
        })
    }

    /// Get the model name
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Check if the diffusion sidecar is healthy
    pub async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.endpoint))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Diffusion health check failed: {}", e);
                false
            }
        }
    }

    /// Generate an image from a validated request
    pub async fn generate(&self, request: &GenerationRequest, size: &str) -> Result<ImageArtifact> {
        let mut body = serde_json::json!({
            "prompt": request.prompt(),
            "model": self.model_name,
            "size": size,
            "n": 1,
            "response_format": "b64_json",
            "guidance_scale": request.guidance_scale(),
            "num_inference_steps": request.steps(),
        });
        if let Some(neg) = request.negative_prompt() {
            body["negative_prompt"] = serde_json::json!(neg);
        }

        let url = format!("{}/v1/images/generations", self.endpoint);
        debug!("Diffusion generate POST {}", url);

        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "diffusion sidecar returned {}: {}",
                status,
                text
            ));
        }

        let api_response: OpenAIImageResponse = response.json().await?;
        let first = api_response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("empty response from diffusion sidecar"))?;

        if let Some(ref revised) = first.revised_prompt {
            debug!("Sidecar revised prompt: {}", revised);
        }

        let base64_image = first
            .b64_json
            .ok_or_else(|| anyhow::anyhow!("no b64_json in response"))?;

        Ok(ImageArtifact::from_base64(PNG_MIME_TYPE, &base64_image)?)
    }

    /// List available models from the diffusion sidecar
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/models", self.endpoint);
        debug!("Diffusion list_models GET {}", url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "diffusion sidecar returned {}: {}",
                status,
                text
            ));
        }

        let model_list: OpenAIModelList = response.json().await?;
        Ok(model_list.data.into_iter().map(|m| m.id).collect())
    }
}

/// Accelerated pipeline backed by the sidecar.
///
/// The arbiter's worker is a plain OS thread, so each call drives the async
/// client to completion on the runtime captured at construction.
pub struct SidecarPipeline {
    runtime: Handle,
    client: DiffusionClient,
    size: String,
}

impl SidecarPipeline {
    /// Probe the sidecar and make sure it serves the requested model
    pub async fn connect(endpoint: &str, model_id: &str, max_edge: u32) -> Result<Self> {
        let client = DiffusionClient::new(endpoint, model_id)?;
        if !client.health_check().await {
            return Err(anyhow::anyhow!("diffusion sidecar at {} is not healthy", endpoint));
        }
        let models = client.list_models().await?;
        if !models.iter().any(|m| m == model_id) {
            return Err(anyhow::anyhow!(
                "diffusion sidecar does not serve model '{}' (available: {})",
                model_id,
                models.join(", ")
            ));
        }
        Ok(Self {
            runtime: Handle::current(),
            client,
            size: sidecar_size(max_edge),
        })
    }
}

impl ImagePipeline for SidecarPipeline {
    fn generate(&mut self, request: &GenerationRequest) -> Result<ImageArtifact, PipelineError> {
        let artifact = self
            .runtime
            .block_on(self.client.generate(request, &self.size))
            .map_err(|e| PipelineError::Backend(format!("{:#}", e)))?;
        if artifact.is_empty() {
            return Err(PipelineError::Backend(
                "diffusion sidecar returned an empty image".to_string(),
            ));
        }
        Ok(artifact)
    }
}
