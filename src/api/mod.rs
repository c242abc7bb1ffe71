// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod admission;
pub mod errors;
pub mod generate_image;
pub mod http_server;
pub mod websocket;

pub use admission::Admission;
pub use errors::ApiError;
pub use generate_image::{
    generate_image_handler, GenerationResponse, ImageGenerationRequest, ResponseStatus,
};
pub use http_server::{build_router, serve, AppState, HealthResponse};
pub use websocket::{websocket_handler, StreamingSession};
