// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::fmt;

use crate::api::generate_image::GenerationResponse;
use crate::arbiter::SubmitError;
use crate::diffusion::ValidationError;

/// Message clients see for any moderation rejection
pub const CONTENT_REJECTED_MESSAGE: &str = "content rejected";

#[derive(Debug, Clone, PartialEq)]
pub enum ApiError {
    /// Body or frame is not a request object
    InvalidRequest(String),
    PayloadTooLarge(String),
    ValidationError {
        field: String,
        message: String,
    },
    /// Moderation said no, or could not be evaluated
    ContentRejected,
    GenerationFailed(String),
    Overloaded {
        depth: usize,
        limit: usize,
    },
    Cancelled,
    Timeout,
    ServiceUnavailable(String),
    /// Streaming frame of a kind the protocol does not use
    InvalidMessage(String),
}

impl ApiError {
    /// Stable machine-readable code carried in `error_type`
    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::PayloadTooLarge(_) => "payload_too_large",
            ApiError::ValidationError { .. } => "validation_error",
            ApiError::ContentRejected => "content_rejected",
            ApiError::GenerationFailed(_) => "generation_failed",
            ApiError::Overloaded { .. } => "overloaded",
            ApiError::Cancelled => "cancelled",
            ApiError::Timeout => "timeout",
            ApiError::ServiceUnavailable(_) => "service_unavailable",
            ApiError::InvalidMessage(_) => "invalid_message",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_)
            | ApiError::ValidationError { .. }
            | ApiError::ContentRejected
            | ApiError::InvalidMessage(_) => 400,
            ApiError::PayloadTooLarge(_) => 413,
            ApiError::GenerationFailed(_) => 500,
            ApiError::Overloaded { .. } | ApiError::ServiceUnavailable(_) => 503,
            // nginx's "client closed request"
            ApiError::Cancelled => 499,
            ApiError::Timeout => 504,
        }
    }

    /// Human-readable message sent in the envelope's `error` field
    pub fn message(&self) -> String {
        match self {
            ApiError::InvalidRequest(msg) => format!("Invalid request format: {}", msg),
            ApiError::PayloadTooLarge(msg) => msg.clone(),
            ApiError::ValidationError { field, message } => {
                if message.starts_with(field.as_str()) {
                    message.clone()
                } else {
                    format!("{}: {}", field, message)
                }
            }
            ApiError::ContentRejected => CONTENT_REJECTED_MESSAGE.to_string(),
            ApiError::GenerationFailed(msg) => msg.clone(),
            ApiError::Overloaded { .. } => {
                "Server is busy, too many queued requests; try again later".to_string()
            }
            ApiError::Cancelled => "Request was cancelled".to_string(),
            ApiError::Timeout => "Request timed out".to_string(),
            ApiError::ServiceUnavailable(msg) => msg.clone(),
            ApiError::InvalidMessage(msg) => msg.clone(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Overloaded { depth, limit } => {
                write!(f, "Overloaded: {} queued, limit {}", depth, limit)
            }
            other => write!(f, "{}: {}", other.error_type(), other.message()),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::ValidationError {
            field: e.field.to_string(),
            message: e.message,
        }
    }
}

impl From<SubmitError> for ApiError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Overloaded { depth, limit } => ApiError::Overloaded { depth, limit },
            SubmitError::ShuttingDown => ApiError::ServiceUnavailable(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(GenerationResponse::from_error(&self))).into_response()
    }
}
