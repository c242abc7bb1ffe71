// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Content gate: the admission check every prompt passes before it may
//! consume the inference resource. Fails closed.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::diffusion::moderation::ModerationPredicate;

pub const DEFAULT_MODERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of screening one prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    /// `reason` is for logs only, clients just see that the content was rejected
    Reject { reason: String },
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }
}

pub struct ContentGate {
    predicate: Arc<dyn ModerationPredicate>,
    timeout: Duration,
}

impl ContentGate {
    pub fn new(predicate: Arc<dyn ModerationPredicate>) -> Self {
        Self::with_timeout(predicate, DEFAULT_MODERATION_TIMEOUT)
    }

    pub fn with_timeout(predicate: Arc<dyn ModerationPredicate>, timeout: Duration) -> Self {
        Self { predicate, timeout }
    }

    /// `true` if the prompt may proceed
    pub async fn check(&self, prompt: &str) -> bool {
        self.screen(prompt).await.is_allowed()
    }

    pub async fn screen(&self, prompt: &str) -> GateDecision {
        match tokio::time::timeout(self.timeout, self.predicate.evaluate(prompt)).await {
            Ok(Ok(true)) => GateDecision::Allow,
            Ok(Ok(false)) => {
                debug!(predicate = self.predicate.name(), "Prompt rejected by moderation");
                GateDecision::Reject {
                    reason: "prompt flagged by moderation".to_string(),
                }
            }
            Ok(Err(e)) => {
                warn!(
                    predicate = self.predicate.name(),
                    error = %e,
                    "Moderation evaluation failed, rejecting prompt"
                );
                GateDecision::Reject {
                    reason: format!("moderation unavailable: {}", e),
                }
            }
            Err(_) => {
                warn!(
                    predicate = self.predicate.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Moderation evaluation timed out, rejecting prompt"
                );
                GateDecision::Reject {
                    reason: "moderation timed out".to_string(),
                }
            }
        }
    }
}
