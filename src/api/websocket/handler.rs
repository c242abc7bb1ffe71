// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! GET /ws upgrade

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;

use super::session::{transport_limit, StreamingSession};
use crate::api::http_server::AppState;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let admission = Arc::clone(&state.admission);
    let max_request_bytes = state.max_request_bytes;
    let limit = transport_limit(max_request_bytes);
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| {
            StreamingSession::new(socket, admission, max_request_bytes).run()
        })
}
