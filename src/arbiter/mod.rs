// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Single-flight arbitration of the inference resource
//!
//! Every admitted request becomes a ticket in one FIFO queue shared by all
//! transports. A dedicated worker thread owns the `InferenceResource` and
//! runs tickets one at a time, oldest first:
//!
//! ```text
//! Queued -> Executing -> { Completed | Failed | Cancelled }
//! ```
//!
//! Cancelling a queued ticket removes it without touching the resource.
//! Cancelling an executing ticket releases the caller immediately, but the
//! generation itself always runs to completion and its result is dropped.

mod ticket;
mod worker;

pub use ticket::{
    CancelResult, GenerationOutcome, Resolution, TicketHandle, TicketId, TicketState,
};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::diffusion::{GenerationRequest, InferenceResource, ResourceInfo};
use ticket::InFlightTicket;

#[derive(Debug, Clone, Default)]
pub struct ArbiterConfig {
    /// Reject submissions once this many tickets are queued. `None` = unbounded.
    pub max_queue_depth: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("generation queue is full ({depth} queued, limit {limit})")]
    Overloaded { depth: usize, limit: usize },

    #[error("generation service is shutting down")]
    ShuttingDown,
}

/// Point-in-time queue counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct ArbiterStats {
    pub queued: usize,
    pub executing: usize,
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    /// Results of cancelled-while-executing tickets that were thrown away
    pub discarded: u64,
}

pub(crate) struct QueueState {
    pub queue: VecDeque<TicketId>,
    pub tickets: HashMap<TicketId, InFlightTicket>,
    pub executing: Option<TicketId>,
    pub accepting: bool,
    pub stats: ArbiterStats,
}

pub(crate) struct Shared {
    state: Mutex<QueueState>,
    work_ready: Condvar,
}

impl Shared {
    /// A panic while holding the lock cannot leave the queue half-updated,
    /// so a poisoned mutex is still usable.
    pub fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

pub struct GenerationArbiter {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    resource_info: ResourceInfo,
    config: ArbiterConfig,
}

impl GenerationArbiter {
    /// Take ownership of the resource and start the worker thread
    pub fn start(resource: InferenceResource, config: ArbiterConfig) -> std::io::Result<Self> {
        let resource_info = resource.info().clone();
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                tickets: HashMap::new(),
                executing: None,
                accepting: true,
                stats: ArbiterStats::default(),
            }),
            work_ready: Condvar::new(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("generation-worker".to_string())
            .spawn(move || worker::run(worker_shared, resource))?;

        info!(
            backend = %resource_info.backend,
            model_id = %resource_info.model_id,
            max_queue_depth = ?config.max_queue_depth,
            "Generation arbiter started"
        );

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
            resource_info,
            config,
        })
    }

    /// Enqueue a validated request. Never blocks on generation.
    pub fn submit(&self, request: GenerationRequest) -> Result<TicketHandle, SubmitError> {
        let mut state = self.shared.lock();
        if !state.accepting {
            return Err(SubmitError::ShuttingDown);
        }
        if let Some(limit) = self.config.max_queue_depth {
            let depth = state.queue.len();
            if depth >= limit {
                warn!(queue_depth = depth, limit, "Generation queue full, rejecting submission");
                return Err(SubmitError::Overloaded { depth, limit });
            }
        }

        let (ticket, handle) = InFlightTicket::new(request);
        let id = ticket.id;
        state.queue.push_back(id);
        state.tickets.insert(id, ticket);
        state.stats.submitted += 1;
        let queue_depth = state.queue.len();
        drop(state);

        self.shared.work_ready.notify_one();
        debug!(ticket_id = %id, queue_depth, "Ticket queued");
        Ok(handle)
    }

    /// Wait for a ticket's outcome without blocking other arbiter activity
    pub async fn wait(&self, handle: &TicketHandle) -> GenerationOutcome {
        handle.outcome().await
    }

    /// Like `wait`, with queue timing
    pub async fn wait_report(&self, handle: &TicketHandle) -> Resolution {
        handle.resolution().await
    }

    pub fn cancel(&self, handle: &TicketHandle) -> CancelResult {
        let id = handle.id();
        let mut state = self.shared.lock();

        let Some(ticket_state) = state.tickets.get(&id).map(|t| t.state) else {
            return CancelResult::AlreadyResolved;
        };

        match ticket_state {
            TicketState::Queued => {
                state.queue.retain(|queued| *queued != id);
                if let Some(ticket) = state.tickets.remove(&id) {
                    ticket.resolve(GenerationOutcome::Cancelled);
                }
                state.stats.cancelled += 1;
                info!(ticket_id = %id, "Queued ticket cancelled");
                CancelResult::Dequeued
            }
            TicketState::Executing => {
                let Some(ticket) = state.tickets.get(&id) else {
                    return CancelResult::AlreadyResolved;
                };
                if ticket.cancel_flag.swap(true, Ordering::AcqRel) {
                    return CancelResult::AlreadyResolved;
                }
                ticket.resolve(GenerationOutcome::Cancelled);
                state.stats.cancelled += 1;
                info!(
                    ticket_id = %id,
                    "Executing ticket cancelled, generation continues and its result will be discarded"
                );
                CancelResult::Detached
            }
        }
    }

    /// Number of tickets waiting to execute
    pub fn queue_depth(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Tickets still known to the arbiter, queued or executing
    pub fn ticket_count(&self) -> usize {
        self.shared.lock().tickets.len()
    }

    pub fn stats(&self) -> ArbiterStats {
        let state = self.shared.lock();
        let mut stats = state.stats.clone();
        stats.queued = state.queue.len();
        stats.executing = usize::from(state.executing.is_some());
        stats
    }

    pub fn max_queue_depth(&self) -> Option<usize> {
        self.config.max_queue_depth
    }

    pub fn resource_info(&self) -> &ResourceInfo {
        &self.resource_info
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.lock().accepting
    }

    fn stop_accepting(&self) {
        self.shared.lock().accepting = false;
        self.shared.work_ready.notify_all();
    }

    /// Stop admission, let the worker finish everything already queued,
    /// then join it.
    pub async fn shutdown(&self) {
        self.stop_accepting();
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(worker) = worker {
            info!(queued = self.queue_depth(), "Draining generation queue");
            match tokio::task::spawn_blocking(move || worker.join()).await {
                Ok(Ok(())) => info!("Generation worker stopped"),
                Ok(Err(_)) => warn!("Generation worker panicked during shutdown"),
                Err(e) => warn!("Failed to join generation worker: {}", e),
            }
        }
    }
}

impl Drop for GenerationArbiter {
    fn drop(&mut self) {
        // The detached worker keeps its own reference and drains the queue
        self.stop_accepting();
    }
}
