// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Prompt safety classifier using keyword blocklist and LLM-based classification

use async_trait::async_trait;

use crate::diffusion::moderation::{ModerationError, ModerationPredicate};
use crate::diffusion::safety::{SafetyCategory, SafetyConfig, SafetyResult};

/// Blocked keyword entries: (keyword, associated category)
const KEYWORD_BLOCKLIST: &[(&str, SafetyCategory)] = &[
    ("nude", SafetyCategory::Sexual),
    ("naked", SafetyCategory::Sexual),
    ("pornographic", SafetyCategory::Sexual),
    ("explicit sexual", SafetyCategory::Sexual),
    ("gore", SafetyCategory::Violence),
    ("dismember", SafetyCategory::Violence),
    ("graphic violence", SafetyCategory::Violence),
    ("beheading", SafetyCategory::Violence),
    ("racial slur", SafetyCategory::Hate),
    ("white supremacy", SafetyCategory::Hate),
    ("suicide", SafetyCategory::SelfHarm),
    ("self-harm", SafetyCategory::SelfHarm),
    ("bomb making", SafetyCategory::Illegal),
    ("illegal drugs", SafetyCategory::Illegal),
    ("child exploitation", SafetyCategory::Illegal),
    ("fake passport", SafetyCategory::Deceptive),
    ("counterfeit money", SafetyCategory::Deceptive),
];

/// Classifier that checks image generation prompts for safety violations.
///
/// Two-stage pipeline:
/// 1. Fast keyword check (`check_keywords`), no external calls
/// 2. LLM-based classification: a caller sends the prompt from
///    `build_classification_prompt` to an LLM and passes the reply to
///    `classify` (see `ClassifierModerator`)
#[derive(Debug, Clone)]
pub struct PromptSafetyClassifier {
    config: SafetyConfig,
}

impl PromptSafetyClassifier {
    pub fn new(config: SafetyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Fast keyword-based check. Returns a safe result if no blocked keywords are found.
    pub fn check_keywords(&self, prompt: &str) -> SafetyResult {
        let lower = prompt.to_lowercase();
        for &(keyword, category) in KEYWORD_BLOCKLIST {
            if lower.contains(keyword) && self.config.blocks(category) {
                return SafetyResult::unsafe_because(
                    category,
                    format!("Blocked keyword detected: {}", keyword),
                );
            }
        }
        for term in &self.config.custom_blocked_terms {
            if lower.contains(&term.to_lowercase()) {
                return SafetyResult::unsafe_because(
                    SafetyCategory::Other,
                    format!("Custom blocked term detected: {}", term),
                );
            }
        }
        SafetyResult::safe()
    }

    /// Build an LLM classification prompt. The caller sends this to the LLM
    /// and passes the response back to `classify`.
    pub fn build_classification_prompt(&self, user_prompt: &str) -> String {
        format!(
            "You are a content safety classifier for image generation prompts. \
             Analyze the following prompt and determine if it is safe or unsafe \
             for image generation.\n\n\
             Prompt: \"{}\"\n\n\
             Respond with a JSON object:\n\
             {{\"is_safe\": true/false, \"category\": \"violence\"|\"sexual\"|\"hate\"|\"self_harm\"|\"illegal\"|\"deceptive\"|\"other\"|null, \"reason\": \"...\" or null}}\n\n\
             Categories to check: violence, sexual, hate, self_harm, illegal, deceptive, other.\n\
             Only respond with the JSON object, no extra text.",
            user_prompt.replace('"', "'")
        )
    }

    /// Parse an LLM safety response. Malformed output defaults to unsafe.
    pub fn parse_safety_response(&self, llm_output: &str) -> SafetyResult {
        let trimmed = strip_code_fence(llm_output);
        match serde_json::from_str::<SafetyResult>(trimmed) {
            Ok(result) => result,
            Err(_) => SafetyResult {
                is_safe: false,
                category: Some(SafetyCategory::Other),
                reason: Some("Failed to parse safety response; defaulting to unsafe".to_string()),
                confidence: 0.0,
            },
        }
    }

    /// Classify an LLM response, applying the blocked_categories filter.
    /// A flagged category that is not blocked at this safety level is overridden to safe.
    pub fn classify(&self, llm_output: &str) -> SafetyResult {
        let mut result = self.parse_safety_response(llm_output);
        if !result.is_safe {
            if let Some(cat) = result.category {
                if !self.config.blocks(cat) && cat != SafetyCategory::Other {
                    result.is_safe = true;
                    result.reason = None;
                }
            }
        }
        result
    }
}

/// LLMs like to wrap JSON in ```json fences
fn strip_code_fence(output: &str) -> &str {
    let trimmed = output.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[async_trait]
impl ModerationPredicate for PromptSafetyClassifier {
    fn name(&self) -> &str {
        "keyword_blocklist"
    }

    async fn evaluate(&self, prompt: &str) -> Result<bool, ModerationError> {
        Ok(self.check_keywords(prompt).is_safe)
    }
}
