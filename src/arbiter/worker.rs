// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! The serialized execution loop

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::ticket::{GenerationOutcome, TicketId, TicketState};
use super::Shared;
use crate::diffusion::{GenerationRequest, InferenceResource};

/// Resolves every remaining ticket if the worker unwinds, so no caller
/// waits forever on a thread that no longer exists
struct PanicGuard {
    shared: Arc<Shared>,
}

impl Drop for PanicGuard {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        let mut state = self.shared.lock();
        state.accepting = false;
        state.queue.clear();
        state.executing = None;
        let orphaned: Vec<_> = state.tickets.drain().map(|(_, ticket)| ticket).collect();
        error!(orphaned = orphaned.len(), "Generation worker crashed, failing remaining tickets");
        for ticket in orphaned {
            if !ticket.is_cancelled() {
                ticket.resolve(GenerationOutcome::Failed(
                    "generation worker crashed".to_string(),
                ));
                state.stats.failed += 1;
            }
        }
    }
}

/// Block until a ticket is queued and mark it executing.
/// `None` once admission is closed and the queue is empty.
fn next_ticket(shared: &Shared) -> Option<(TicketId, GenerationRequest)> {
    let mut state = shared.lock();
    loop {
        while let Some(id) = state.queue.pop_front() {
            let Some(ticket) = state.tickets.get_mut(&id) else {
                continue;
            };
            let now = Instant::now();
            ticket.state = TicketState::Executing;
            ticket.started_at = Some(now);
            let request = ticket.request.clone();
            let waited_ms = now.duration_since(ticket.submitted_at).as_millis() as u64;
            state.executing = Some(id);
            debug!(ticket_id = %id, waited_ms, queue_depth = state.queue.len(), "Ticket executing");
            return Some((id, request));
        }
        if !state.accepting {
            return None;
        }
        state = shared
            .work_ready
            .wait(state)
            .unwrap_or_else(|e| e.into_inner());
    }
}

pub(crate) fn run(shared: Arc<Shared>, mut resource: InferenceResource) {
    let _guard = PanicGuard {
        shared: Arc::clone(&shared),
    };

    while let Some((id, request)) = next_ticket(&shared) {
        let start = Instant::now();
        let result = resource.generate(&request);
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let mut state = shared.lock();
        state.executing = None;
        let Some(ticket) = state.tickets.remove(&id) else {
            continue;
        };

        if ticket.is_cancelled() {
            // The caller was already answered with Cancelled
            state.stats.discarded += 1;
            match result {
                Ok(artifact) => info!(
                    ticket_id = %id,
                    elapsed_ms,
                    bytes = artifact.len(),
                    "Discarded result of cancelled ticket"
                ),
                Err(e) => info!(
                    ticket_id = %id,
                    elapsed_ms,
                    error = %e,
                    "Discarded failure of cancelled ticket"
                ),
            }
            continue;
        }

        let outcome = match result {
            Ok(artifact) => {
                state.stats.completed += 1;
                info!(ticket_id = %id, elapsed_ms, bytes = artifact.len(), "Image generated");
                GenerationOutcome::Success(artifact)
            }
            Err(e) => {
                state.stats.failed += 1;
                warn!(ticket_id = %id, elapsed_ms, error = %e, "Image generation failed");
                GenerationOutcome::Failed(format!("Image generation failed: {}", e))
            }
        };

        if !ticket.resolve(outcome) {
            debug!(ticket_id = %id, "Outcome ready but no caller is waiting for it");
        }
    }

    info!("Generation worker exiting, queue drained");
}
