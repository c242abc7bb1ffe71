// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod api;
pub mod arbiter;
pub mod config;
pub mod diffusion;
pub mod version;

pub use api::{Admission, ApiError, AppState};
pub use arbiter::{
    ArbiterConfig, ArbiterStats, CancelResult, GenerationArbiter, GenerationOutcome, SubmitError,
    TicketHandle,
};
pub use config::Settings;
pub use diffusion::{
    ContentGate, GenerationRequest, ImageArtifact, InferenceResource, ModerationPredicate,
};
