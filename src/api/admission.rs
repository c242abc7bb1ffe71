// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Admission pipeline shared by the REST and WebSocket adapters
//!
//! validate -> content gate -> arbiter. Validation and moderation failures
//! return before the arbiter is touched.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::errors::ApiError;
use crate::api::generate_image::ImageGenerationRequest;
use crate::arbiter::{CancelResult, GenerationArbiter, GenerationOutcome, TicketHandle};
use crate::diffusion::{ContentGate, GateDecision, ImageArtifact};

pub struct Admission {
    gate: Arc<ContentGate>,
    arbiter: Arc<GenerationArbiter>,
    request_timeout: Option<Duration>,
}

impl Admission {
    pub fn new(
        gate: Arc<ContentGate>,
        arbiter: Arc<GenerationArbiter>,
        request_timeout: Option<Duration>,
    ) -> Self {
        Self {
            gate,
            arbiter,
            request_timeout,
        }
    }

    pub fn arbiter(&self) -> &Arc<GenerationArbiter> {
        &self.arbiter
    }

    /// Parse one streaming frame
    pub fn parse(text: &str) -> Result<ImageGenerationRequest, ApiError> {
        serde_json::from_str(text).map_err(|e| ApiError::InvalidRequest(e.to_string()))
    }

    /// Validate, screen and enqueue. Returns the ticket to wait on.
    pub async fn admit(&self, raw: ImageGenerationRequest) -> Result<TicketHandle, ApiError> {
        let request = raw.validate().map_err(|e| {
            debug!(field = e.field, "Request failed validation: {}", e.message);
            ApiError::from(e)
        })?;

        if let GateDecision::Reject { reason } = self.gate.screen(request.prompt()).await {
            info!(reason = %reason, "Prompt rejected by content gate");
            return Err(ApiError::ContentRejected);
        }

        let handle = self.arbiter.submit(request)?;
        Ok(handle)
    }

    /// Wait for the ticket, honouring the adapter timeout. A timeout only
    /// stops this caller from waiting; the ticket still runs to completion.
    pub async fn await_outcome(&self, handle: &TicketHandle) -> Result<ImageArtifact, ApiError> {
        let outcome = match self.request_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.arbiter.wait(handle)).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        ticket_id = %handle.id(),
                        timeout_ms = limit.as_millis() as u64,
                        "Stopped waiting for generation outcome"
                    );
                    return Err(ApiError::Timeout);
                }
            },
            None => self.arbiter.wait(handle).await,
        };

        match outcome {
            GenerationOutcome::Success(artifact) => Ok(artifact),
            GenerationOutcome::Failed(message) => Err(ApiError::GenerationFailed(message)),
            GenerationOutcome::Rejected(_) => Err(ApiError::ContentRejected),
            GenerationOutcome::Cancelled => Err(ApiError::Cancelled),
        }
    }

    /// Full one-shot pipeline used by the REST adapter. If the caller's
    /// future is dropped mid-wait (client went away) the ticket is cancelled.
    pub async fn generate(&self, raw: ImageGenerationRequest) -> Result<ImageArtifact, ApiError> {
        let handle = self.admit(raw).await?;
        let mut guard = CancelOnDrop {
            arbiter: self.arbiter.as_ref(),
            handle: &handle,
            armed: true,
        };
        let result = self.await_outcome(&handle).await;
        guard.armed = false;
        result
    }

    pub fn cancel(&self, handle: &TicketHandle) -> CancelResult {
        self.arbiter.cancel(handle)
    }
}

struct CancelOnDrop<'a> {
    arbiter: &'a GenerationArbiter,
    handle: &'a TicketHandle,
    armed: bool,
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            let result = self.arbiter.cancel(self.handle);
            debug!(ticket_id = %self.handle.id(), ?result, "Caller dropped before outcome");
        }
    }
}
