// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image generation response envelope, shared by REST and WebSocket

use serde::{Deserialize, Serialize};

use crate::api::errors::ApiError;
use crate::diffusion::ImageArtifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// `{status, image_url?, error?, error_type?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub status: ResponseStatus,
    /// `data:` URL of the generated image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
}

impl GenerationResponse {
    pub fn success(artifact: &ImageArtifact) -> Self {
        Self {
            status: ResponseStatus::Success,
            image_url: Some(artifact.to_data_url()),
            error: None,
            error_type: None,
        }
    }

    pub fn from_error(error: &ApiError) -> Self {
        Self {
            status: ResponseStatus::Error,
            image_url: None,
            error: Some(error.message()),
            error_type: Some(error.error_type().to_string()),
        }
    }

    pub fn from_result(result: &Result<ImageArtifact, ApiError>) -> Self {
        match result {
            Ok(artifact) => Self::success(artifact),
            Err(e) => Self::from_error(e),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}
