// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Streaming adapter: one JSON request per text frame, one JSON response back

pub mod handler;
pub mod session;

pub use handler::websocket_handler;
pub use session::{transport_limit, StreamingSession, MAX_BUFFERED_FRAMES};
