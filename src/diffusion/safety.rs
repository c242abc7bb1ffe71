// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Safety types and configuration for prompt moderation

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Safety enforcement level controlling which categories are blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SafetyLevel {
    #[default]
    Strict,
    Moderate,
    Permissive,
}

/// Categories of unsafe content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCategory {
    Violence,
    Sexual,
    Hate,
    SelfHarm,
    Illegal,
    Deceptive,
    Other,
}

/// Result of a safety classification check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyResult {
    pub is_safe: bool,
    pub category: Option<SafetyCategory>,
    pub reason: Option<String>,
    #[serde(default)]
    pub confidence: f32,
}

impl SafetyResult {
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            category: None,
            reason: None,
            confidence: 1.0,
        }
    }

    pub fn unsafe_because(category: SafetyCategory, reason: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            category: Some(category),
            reason: Some(reason.into()),
            confidence: 1.0,
        }
    }
}

/// Configuration for safety classification
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    pub level: SafetyLevel,
    pub blocked_categories: Vec<SafetyCategory>,
    pub custom_blocked_terms: Vec<String>,
}

impl SafetyConfig {
    /// Category set for a given enforcement level
    pub fn for_level(level: SafetyLevel) -> Self {
        let blocked_categories = match level {
            SafetyLevel::Strict => vec![
                SafetyCategory::Sexual,
                SafetyCategory::Violence,
                SafetyCategory::Illegal,
                SafetyCategory::SelfHarm,
                SafetyCategory::Hate,
                SafetyCategory::Deceptive,
            ],
            SafetyLevel::Moderate => vec![
                SafetyCategory::Sexual,
                SafetyCategory::Illegal,
                SafetyCategory::SelfHarm,
            ],
            SafetyLevel::Permissive => vec![SafetyCategory::Illegal],
        };
        Self {
            level,
            blocked_categories,
            custom_blocked_terms: Vec::new(),
        }
    }

    pub fn with_blocked_terms(mut self, terms: Vec<String>) -> Self {
        self.custom_blocked_terms = terms
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self
    }

    pub fn blocks(&self, category: SafetyCategory) -> bool {
        self.blocked_categories.contains(&category)
    }
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self::for_level(SafetyLevel::default())
    }
}
