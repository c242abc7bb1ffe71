// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Runtime settings, read once at startup from flags or the environment

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::arbiter::ArbiterConfig;
use crate::diffusion::procedural::MIN_EDGE;
use crate::diffusion::{
    ClassifierModerator, ContentGate, ExecutionBackend, LayeredModerator, ModerationPredicate,
    PromptSafetyClassifier, ResourceConfig, SafetyConfig, SafetyLevel,
};
use crate::version;

/// Diffusion gateway settings
#[derive(Parser, Debug, Clone)]
#[command(name = "diffusion-gateway")]
#[command(version = version::VERSION_NUMBER)]
#[command(about = "Moderated, single-flight text-to-image service", long_about = None)]
pub struct Settings {
    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "API_PORT", default_value_t = 8000)]
    pub api_port: u16,

    /// Version reported by /health
    #[arg(long, env = "API_VERSION", default_value = version::VERSION_NUMBER)]
    pub api_version: String,

    /// Verbose logging unless RUST_LOG says otherwise
    #[arg(long, env = "DEBUG")]
    pub debug: bool,

    #[arg(long, env = "MODEL_ID", default_value = "stabilityai/stable-diffusion-2-1")]
    pub model_id: String,

    /// Requested execution backend; `cuda` falls back to `cpu` when unavailable
    #[arg(long, env = "DEVICE", value_enum, default_value_t = ExecutionBackend::Cuda)]
    pub device: ExecutionBackend,

    /// Base URL of the OpenAI-compatible diffusion sidecar
    #[arg(long, env = "DIFFUSION_ENDPOINT", default_value = "http://localhost:8081")]
    pub diffusion_endpoint: String,

    /// Output edge length in pixels
    #[arg(long, env = "MAX_IMAGE_SIZE", default_value_t = 512)]
    pub max_image_size: u32,

    /// Largest accepted request body or WebSocket frame
    #[arg(long, env = "MAX_REQUEST_BYTES", default_value_t = 65536)]
    pub max_request_bytes: usize,

    /// Queued tickets allowed before submissions are refused; unbounded when unset
    #[arg(long, env = "MAX_QUEUE_DEPTH")]
    pub max_queue_depth: Option<usize>,

    /// How long an adapter waits for an outcome; forever when unset
    #[arg(long, env = "REQUEST_TIMEOUT_SECS")]
    pub request_timeout_secs: Option<u64>,

    #[arg(long, env = "SAFETY_LEVEL", value_enum, default_value_t = SafetyLevel::Strict)]
    pub safety_level: SafetyLevel,

    /// Extra blocked terms, comma separated
    #[arg(long, env = "BLOCKED_TERMS", value_delimiter = ',')]
    pub blocked_terms: Vec<String>,

    /// Chat-completions endpoint for the second moderation stage
    #[arg(long, env = "MODERATION_ENDPOINT", requires = "moderation_model")]
    pub moderation_endpoint: Option<String>,

    #[arg(long, env = "MODERATION_MODEL")]
    pub moderation_model: Option<String>,

    #[arg(long, env = "MODERATION_TIMEOUT_MS", default_value_t = 5000)]
    pub moderation_timeout_ms: u64,
}

impl Settings {
    /// Reject combinations clap cannot express
    pub fn validate(&self) -> Result<()> {
        if self.max_image_size < MIN_EDGE {
            bail!(
                "MAX_IMAGE_SIZE must be at least {}, got {}",
                MIN_EDGE,
                self.max_image_size
            );
        }
        if self.max_request_bytes == 0 {
            bail!("MAX_REQUEST_BYTES must be greater than zero");
        }
        if self.max_queue_depth == Some(0) {
            bail!("MAX_QUEUE_DEPTH must be greater than zero when set");
        }
        if self.request_timeout_secs == Some(0) {
            bail!("REQUEST_TIMEOUT_SECS must be greater than zero when set");
        }
        if self.moderation_timeout_ms == 0 {
            bail!("MODERATION_TIMEOUT_MS must be greater than zero");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.api_port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.api_port))
    }

    pub fn resource_config(&self) -> ResourceConfig {
        ResourceConfig {
            model_id: self.model_id.clone(),
            device: self.device,
            diffusion_endpoint: self.diffusion_endpoint.clone(),
            max_image_size: self.max_image_size,
        }
    }

    pub fn arbiter_config(&self) -> ArbiterConfig {
        ArbiterConfig {
            max_queue_depth: self.max_queue_depth,
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn moderation_timeout(&self) -> Duration {
        Duration::from_millis(self.moderation_timeout_ms)
    }

    pub fn safety_config(&self) -> SafetyConfig {
        SafetyConfig::for_level(self.safety_level).with_blocked_terms(self.blocked_terms.clone())
    }

    /// Keyword blocklist, followed by the classifier stage when configured
    pub fn build_gate(&self) -> Result<ContentGate> {
        let classifier = PromptSafetyClassifier::new(self.safety_config());
        let mut layers: Vec<Arc<dyn ModerationPredicate>> = vec![Arc::new(classifier.clone())];

        if let (Some(endpoint), Some(model)) = (&self.moderation_endpoint, &self.moderation_model) {
            let remote =
                ClassifierModerator::new(endpoint, model, classifier, self.moderation_timeout())
                    .context("failed to build moderation client")?;
            layers.push(Arc::new(remote));
        }

        Ok(ContentGate::with_timeout(
            Arc::new(LayeredModerator::new(layers)),
            self.moderation_timeout(),
        ))
    }
}
