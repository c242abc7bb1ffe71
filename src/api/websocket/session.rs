// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! One streaming connection
//!
//! Requests on a connection are handled strictly one at a time. While a
//! generation is pending the socket is still read, so a disconnect cancels
//! the outstanding ticket straight away; text frames that arrive in the
//! meantime are buffered and answered in order afterwards.
//!
//! Text frames longer than the request limit are answered with
//! `payload_too_large` and the connection stays open. Only frames beyond the
//! transport limit (see [`transport_limit`]) drop the connection.

use std::collections::VecDeque;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::api::admission::Admission;
use crate::api::errors::ApiError;
use crate::api::generate_image::GenerationResponse;

/// Frames buffered while a generation is pending; extra frames are refused
pub const MAX_BUFFERED_FRAMES: usize = 16;

/// Largest message the socket accepts before giving up on the connection
pub fn transport_limit(max_request_bytes: usize) -> usize {
    max_request_bytes.saturating_mul(4)
}

enum Inbound {
    Text(String),
    Binary,
    /// Ping/pong; axum answers pings itself
    Control,
    Closed,
}

fn classify(frame: Option<Result<Message, axum::Error>>) -> Inbound {
    match frame {
        Some(Ok(Message::Text(text))) => Inbound::Text(text),
        Some(Ok(Message::Binary(_))) => Inbound::Binary,
        Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => Inbound::Control,
        Some(Ok(Message::Close(_))) | None => Inbound::Closed,
        Some(Err(e)) => {
            debug!("WebSocket receive error, closing connection: {}", e);
            Inbound::Closed
        }
    }
}

enum Step {
    Reply(GenerationResponse),
    Disconnected,
}

pub struct StreamingSession {
    connection_id: Uuid,
    admission: Arc<Admission>,
    max_request_bytes: usize,
    sender: SplitSink<WebSocket, Message>,
    receiver: SplitStream<WebSocket>,
    buffered: VecDeque<Inbound>,
    refused: usize,
}

impl StreamingSession {
    pub fn new(socket: WebSocket, admission: Arc<Admission>, max_request_bytes: usize) -> Self {
        let (sender, receiver) = socket.split();
        Self {
            connection_id: Uuid::new_v4(),
            admission,
            max_request_bytes,
            sender,
            receiver,
            buffered: VecDeque::new(),
            refused: 0,
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Serve the connection until the client goes away
    pub async fn run(self) {
        let span = info_span!("ws_session", connection_id = %self.connection_id);
        self.serve().instrument(span).await
    }

    async fn serve(mut self) {
        info!("WebSocket connection opened");
        let mut handled = 0usize;

        'session: loop {
            let inbound = match self.buffered.pop_front() {
                Some(frame) => frame,
                None => classify(self.receiver.next().await),
            };

            let step = match inbound {
                Inbound::Text(text) if text.len() > self.max_request_bytes => {
                    debug!(bytes = text.len(), "Oversized text frame");
                    Step::Reply(GenerationResponse::from_error(&ApiError::PayloadTooLarge(
                        format!("message exceeds {} bytes", self.max_request_bytes),
                    )))
                }
                Inbound::Text(text) => {
                    handled += 1;
                    self.handle_text(&text).await
                }
                Inbound::Binary => Step::Reply(GenerationResponse::from_error(
                    &ApiError::InvalidMessage("binary frames are not supported".to_string()),
                )),
                Inbound::Control => continue,
                Inbound::Closed => break,
            };

            let response = match step {
                Step::Reply(response) => response,
                Step::Disconnected => break,
            };
            if !self.send(&response).await {
                break;
            }

            while self.refused > 0 {
                self.refused -= 1;
                let busy = GenerationResponse::from_error(&ApiError::Overloaded {
                    depth: MAX_BUFFERED_FRAMES,
                    limit: MAX_BUFFERED_FRAMES,
                });
                if !self.send(&busy).await {
                    break 'session;
                }
            }
        }

        let _ = self.sender.close().await;
        info!(requests = handled, "WebSocket connection closed");
    }

    async fn handle_text(&mut self, text: &str) -> Step {
        let request = match Admission::parse(text) {
            Ok(request) => request,
            Err(e) => {
                debug!("Request parsing error: {}", e);
                return Step::Reply(GenerationResponse::from_error(&e));
            }
        };

        let handle = match self.admission.admit(request).await {
            Ok(handle) => handle,
            Err(e) => return Step::Reply(GenerationResponse::from_error(&e)),
        };
        debug!(ticket_id = %handle.id(), "Request admitted");

        let admission = Arc::clone(&self.admission);
        let outcome = admission.await_outcome(&handle);
        tokio::pin!(outcome);

        loop {
            tokio::select! {
                result = &mut outcome => {
                    return Step::Reply(GenerationResponse::from_result(&result));
                }
                frame = self.receiver.next() => match classify(frame) {
                    Inbound::Closed => {
                        let result = self.admission.cancel(&handle);
                        info!(
                            ticket_id = %handle.id(),
                            ?result,
                            "Client disconnected with a request outstanding"
                        );
                        return Step::Disconnected;
                    }
                    Inbound::Control => {}
                    frame => {
                        if self.buffered.len() < MAX_BUFFERED_FRAMES {
                            self.buffered.push_back(frame);
                        } else {
                            warn!("Too many frames buffered, refusing one");
                            self.refused += 1;
                        }
                    }
                },
            }
        }
    }

    async fn send(&mut self, response: &GenerationResponse) -> bool {
        let payload = match serde_json::to_string(response) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize response: {}", e);
                return false;
            }
        };
        match self.sender.send(Message::Text(payload)).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Failed to send WebSocket response: {}", e);
                false
            }
        }
    }
}
