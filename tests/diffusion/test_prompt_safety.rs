// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tests for the prompt safety classifier and safety levels

use diffusion_gateway::diffusion::moderation::ModerationPredicate;
use diffusion_gateway::diffusion::prompt_safety::PromptSafetyClassifier;
use diffusion_gateway::diffusion::safety::{SafetyCategory, SafetyConfig, SafetyLevel};

#[test]
fn test_keyword_blocklist_detects_unsafe_terms() {
    let classifier = PromptSafetyClassifier::new(SafetyConfig::default());
    let result = classifier.check_keywords("generate a nude image of a person");
    assert!(!result.is_safe, "Should detect unsafe keyword");
    assert_eq!(result.category, Some(SafetyCategory::Sexual));
}

#[test]
fn test_keyword_match_is_case_insensitive() {
    let classifier = PromptSafetyClassifier::new(SafetyConfig::default());
    assert!(!classifier.check_keywords("Scene full of GORE").is_safe);
}

#[test]
fn test_benign_prompt_passes_keyword_check() {
    let classifier = PromptSafetyClassifier::new(SafetyConfig::default());
    let result = classifier.check_keywords("a beautiful sunset over the ocean");
    assert!(result.is_safe, "Benign prompt should pass keyword check");
    assert!(result.category.is_none());
}

#[test]
fn test_custom_blocked_terms() {
    let config = SafetyConfig::for_level(SafetyLevel::Permissive)
        .with_blocked_terms(vec!["  Mascot ".to_string(), "".to_string()]);
    assert_eq!(config.custom_blocked_terms, vec!["Mascot"]);

    let classifier = PromptSafetyClassifier::new(config);
    let result = classifier.check_keywords("our team mascot surfing");
    assert!(!result.is_safe);
    assert_eq!(result.category, Some(SafetyCategory::Other));
}

#[test]
fn test_level_selects_blocked_categories() {
    let strict = SafetyConfig::for_level(SafetyLevel::Strict);
    let moderate = SafetyConfig::for_level(SafetyLevel::Moderate);
    let permissive = SafetyConfig::for_level(SafetyLevel::Permissive);

    assert_eq!(strict.blocked_categories.len(), 6);
    assert!(strict.blocks(SafetyCategory::Hate));
    assert!(!moderate.blocks(SafetyCategory::Hate));
    assert!(moderate.blocks(SafetyCategory::Sexual));
    assert!(permissive.blocks(SafetyCategory::Illegal));
    assert!(!permissive.blocks(SafetyCategory::Violence));
}

#[test]
fn test_safety_level_default_is_strict() {
    assert_eq!(SafetyLevel::default(), SafetyLevel::Strict);
    assert_eq!(SafetyConfig::default().level, SafetyLevel::Strict);
}

#[test]
fn test_permissive_keyword_check_lets_violence_through() {
    let classifier = PromptSafetyClassifier::new(SafetyConfig::for_level(SafetyLevel::Permissive));
    assert!(classifier.check_keywords("a medieval battle with gore").is_safe);
    assert!(!classifier.check_keywords("bomb making tutorial").is_safe);
}

#[test]
fn test_classification_prompt_format_is_valid() {
    let classifier = PromptSafetyClassifier::new(SafetyConfig::default());
    let prompt = classifier.build_classification_prompt("a cat sitting on a windowsill");
    assert!(prompt.contains("cat sitting on a windowsill"));
    assert!(prompt.contains("JSON"));
}

#[test]
fn test_parse_safety_response_unsafe() {
    let classifier = PromptSafetyClassifier::new(SafetyConfig::default());
    let llm_output =
        r#"{"is_safe": false, "category": "violence", "reason": "depicts graphic violence"}"#;
    let result = classifier.parse_safety_response(llm_output);
    assert!(!result.is_safe);
    assert_eq!(result.category, Some(SafetyCategory::Violence));
}

#[test]
fn test_parse_safety_response_in_code_fence() {
    let classifier = PromptSafetyClassifier::new(SafetyConfig::default());
    let llm_output = "```json\n{\"is_safe\": true, \"category\": null, \"reason\": null}\n```";
    assert!(classifier.parse_safety_response(llm_output).is_safe);
}

#[test]
fn test_parse_safety_response_malformed_defaults_unsafe() {
    let classifier = PromptSafetyClassifier::new(SafetyConfig::default());
    let result = classifier.parse_safety_response("this is not valid json at all");
    assert!(!result.is_safe, "Malformed response should default to unsafe");
}

#[test]
fn test_classify_respects_level() {
    let strict = PromptSafetyClassifier::new(SafetyConfig::for_level(SafetyLevel::Strict));
    let moderate = PromptSafetyClassifier::new(SafetyConfig::for_level(SafetyLevel::Moderate));

    let hate_response = r#"{"is_safe": false, "category": "hate", "reason": "hate speech"}"#;
    assert!(!strict.classify(hate_response).is_safe);
    assert!(moderate.classify(hate_response).is_safe);
}

#[test]
fn test_classify_never_clears_unparseable_verdict() {
    let permissive = PromptSafetyClassifier::new(SafetyConfig::for_level(SafetyLevel::Permissive));
    assert!(!permissive.classify("garbage").is_safe);
}

#[tokio::test]
async fn test_classifier_as_moderation_predicate() {
    let classifier = PromptSafetyClassifier::new(SafetyConfig::default());
    assert_eq!(classifier.name(), "keyword_blocklist");
    assert!(classifier.evaluate("a watercolor fox").await.unwrap());
    assert!(!classifier.evaluate("naked figure").await.unwrap());
}
