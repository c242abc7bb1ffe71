// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image generation: request model, content gate and the inference resource

pub mod artifact;
pub mod client;
pub mod gate;
pub mod moderation;
pub mod pipeline;
pub mod procedural;
pub mod prompt_safety;
pub mod request;
pub mod resource;
pub mod safety;

pub use artifact::ImageArtifact;
pub use client::{DiffusionClient, SidecarPipeline};
pub use gate::{ContentGate, GateDecision};
pub use moderation::{ClassifierModerator, LayeredModerator, ModerationError, ModerationPredicate};
pub use pipeline::{ExecutionBackend, ImagePipeline, PipelineError};
pub use procedural::ProceduralPipeline;
pub use prompt_safety::PromptSafetyClassifier;
pub use request::{GenerationRequest, ValidationError};
pub use resource::{InferenceResource, ResourceConfig, ResourceInfo};
pub use safety::{SafetyCategory, SafetyConfig, SafetyLevel, SafetyResult};
