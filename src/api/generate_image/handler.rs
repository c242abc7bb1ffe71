// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image generation endpoint handler

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use tracing::{debug, info, warn};

use super::request::ImageGenerationRequest;
use super::response::GenerationResponse;
use crate::api::errors::ApiError;
use crate::api::http_server::AppState;

/// POST /generate - Generate an image from a text prompt
///
/// Pipeline:
/// 1. Parse and validate the body (400 without touching moderation)
/// 2. Content gate (400 `content rejected`, arbiter untouched)
/// 3. Submit to the arbiter and wait for the outcome
/// 4. Wrap the outcome in the `{status, image_url, error}` envelope
pub async fn generate_image_handler(
    State(state): State<AppState>,
    payload: Result<Json<ImageGenerationRequest>, JsonRejection>,
) -> Result<Json<GenerationResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("Rejected malformed generation request: {}", rejection.body_text());
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(rejection.body_text())
        } else {
            ApiError::InvalidRequest(rejection.body_text())
        }
    })?;

    debug!(
        "Image generation request received: prompt_len={}, steps={}",
        request.prompt.len(),
        request.steps
    );

    let artifact = state.admission.generate(request).await?;

    info!(
        mime_type = %artifact.mime_type,
        bytes = artifact.len(),
        "Image generation request completed"
    );

    Ok(Json(GenerationResponse::success(&artifact)))
}
