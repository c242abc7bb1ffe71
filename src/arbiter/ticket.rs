// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Tickets, outcomes and the caller-side handle

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::diffusion::{GenerationRequest, ImageArtifact};

pub type TicketId = Uuid;

/// Terminal result of one ticket
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationOutcome {
    Success(ImageArtifact),
    /// Refused by admission (never produced by the arbiter itself)
    Rejected(String),
    Failed(String),
    Cancelled,
}

impl GenerationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GenerationOutcome::Success(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            GenerationOutcome::Success(_) => "success",
            GenerationOutcome::Rejected(_) => "rejected",
            GenerationOutcome::Failed(_) => "failed",
            GenerationOutcome::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    Queued,
    Executing,
}

/// Outcome plus when the ticket moved through the queue
#[derive(Debug, Clone)]
pub struct Resolution {
    pub outcome: GenerationOutcome,
    pub submitted_at: Instant,
    /// `None` if the ticket never reached the resource
    pub started_at: Option<Instant>,
    pub finished_at: Instant,
}

/// What `cancel` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelResult {
    /// Removed from the queue before touching the resource
    Dequeued,
    /// Already executing; the caller was released and the result will be discarded
    Detached,
    /// Nothing left to cancel
    AlreadyResolved,
}

/// The arbiter's record of one admitted request
pub(crate) struct InFlightTicket {
    pub id: TicketId,
    pub request: GenerationRequest,
    pub submitted_at: Instant,
    pub cancel_flag: Arc<AtomicBool>,
    pub state: TicketState,
    pub started_at: Option<Instant>,
    resolver: watch::Sender<Option<Resolution>>,
}

impl InFlightTicket {
    pub fn new(request: GenerationRequest) -> (Self, TicketHandle) {
        let id = Uuid::new_v4();
        let submitted_at = Instant::now();
        let (resolver, receiver) = watch::channel(None);
        let ticket = Self {
            id,
            request,
            submitted_at,
            cancel_flag: Arc::new(AtomicBool::new(false)),
            state: TicketState::Queued,
            started_at: None,
            resolver,
        };
        let handle = TicketHandle {
            id,
            submitted_at,
            receiver,
        };
        (ticket, handle)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_flag.load(Ordering::Acquire)
    }

    /// Publish the terminal outcome. Returns false if no caller is listening.
    pub fn resolve(&self, outcome: GenerationOutcome) -> bool {
        let resolution = Resolution {
            outcome,
            submitted_at: self.submitted_at,
            started_at: self.started_at,
            finished_at: Instant::now(),
        };
        self.resolver.send_replace(Some(resolution));
        self.resolver.receiver_count() > 0
    }
}

/// Caller-side handle returned by `submit`
#[derive(Debug, Clone)]
pub struct TicketHandle {
    id: TicketId,
    submitted_at: Instant,
    receiver: watch::Receiver<Option<Resolution>>,
}

impl TicketHandle {
    pub fn id(&self) -> TicketId {
        self.id
    }

    pub fn submitted_at(&self) -> Instant {
        self.submitted_at
    }

    /// Wait for the terminal outcome. Safe to call repeatedly; later calls
    /// return the same cached value.
    pub async fn resolution(&self) -> Resolution {
        let mut receiver = self.receiver.clone();
        let resolved = receiver
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|value| value.clone());
        match resolved {
            Some(resolution) => resolution,
            // The ticket's sender went away without a value
            None => Resolution {
                outcome: GenerationOutcome::Failed(
                    "generation worker stopped before completing the request".to_string(),
                ),
                submitted_at: self.submitted_at,
                started_at: None,
                finished_at: Instant::now(),
            },
        }
    }

    pub async fn outcome(&self) -> GenerationOutcome {
        self.resolution().await.outcome
    }

    /// Non-blocking peek
    pub fn try_outcome(&self) -> Option<GenerationOutcome> {
        self.receiver
            .borrow()
            .as_ref()
            .map(|resolution| resolution.outcome.clone())
    }
}
