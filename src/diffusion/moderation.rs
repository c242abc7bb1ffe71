// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Moderation predicates
//!
//! A predicate answers "may this prompt be rendered?". It may call out to
//! another service, so evaluation is async and fallible; the `ContentGate`
//! decides what a failure means.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::diffusion::prompt_safety::PromptSafetyClassifier;

#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("moderation service unavailable: {0}")]
    Unavailable(String),

    #[error("moderation service returned an invalid verdict: {0}")]
    InvalidVerdict(String),
}

/// External moderation capability
#[async_trait]
pub trait ModerationPredicate: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// `Ok(true)` means the prompt is allowed
    async fn evaluate(&self, prompt: &str) -> Result<bool, ModerationError>;
}

/// Runs predicates in order; the first one that rejects (or fails) wins
pub struct LayeredModerator {
    layers: Vec<Arc<dyn ModerationPredicate>>,
}

impl LayeredModerator {
    pub fn new(layers: Vec<Arc<dyn ModerationPredicate>>) -> Self {
        Self { layers }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[async_trait]
impl ModerationPredicate for LayeredModerator {
    fn name(&self) -> &str {
        "layered"
    }

    async fn evaluate(&self, prompt: &str) -> Result<bool, ModerationError> {
        for layer in &self.layers {
            if !layer.evaluate(prompt).await? {
                debug!(layer = layer.name(), "Moderation layer rejected prompt");
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// LLM-backed classification stage talking to an OpenAI-compatible
/// chat-completions endpoint
pub struct ClassifierModerator {
    client: Client,
    endpoint: String,
    model: String,
    classifier: PromptSafetyClassifier,
}

impl ClassifierModerator {
    pub fn new(
        endpoint: &str,
        model: &str,
        classifier: PromptSafetyClassifier,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            classifier,
        })
    }
}

#[async_trait]
impl ModerationPredicate for ClassifierModerator {
    fn name(&self) -> &str {
        "llm_classifier"
    }

    async fn evaluate(&self, prompt: &str) -> Result<bool, ModerationError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": 0.0,
            "messages": [{
                "role": "user",
                "content": self.classifier.build_classification_prompt(prompt),
            }],
        });

        let url = format!("{}/v1/chat/completions", self.endpoint);
        debug!("Moderation classify POST {}", url);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ModerationError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModerationError::Unavailable(format!(
                "classifier returned {}",
                response.status()
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ModerationError::InvalidVerdict(e.to_string()))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ModerationError::InvalidVerdict("empty completion".to_string()))?;

        Ok(self.classifier.classify(&content).is_safe)
    }
}
