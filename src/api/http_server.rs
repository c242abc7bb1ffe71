// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use axum::{
    extract::{DefaultBodyLimit, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::admission::Admission;
use super::generate_image::generate_image_handler;
use super::websocket::websocket_handler;
use crate::arbiter::{ArbiterStats, GenerationArbiter};
use crate::version;

#[derive(Clone)]
pub struct AppState {
    pub admission: Arc<Admission>,
    pub arbiter: Arc<GenerationArbiter>,
    /// Largest accepted body or frame
    pub max_request_bytes: usize,
    pub api_version: String,
    pub start_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(admission: Arc<Admission>, max_request_bytes: usize, api_version: impl Into<String>) -> Self {
        Self {
            arbiter: Arc::clone(admission.arbiter()),
            admission,
            max_request_bytes,
            api_version: api_version.into(),
            start_time: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when running on the CPU fallback
    pub status: String,
    pub version: String,
    /// Build string, date and feature list
    pub build: serde_json::Value,
    pub model_id: String,
    pub backend: String,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub accepting: bool,
    pub start_time: DateTime<Utc>,
    pub uptime_secs: i64,
    pub max_queue_depth: Option<usize>,
    pub queue: ArbiterStats,
}

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_request_bytes;
    Router::new()
        // Health check
        .route("/health", get(health_handler))
        // One-shot generation
        .route("/generate", post(generate_image_handler))
        // Streaming generation
        .route("/ws", get(websocket_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let info = state.arbiter.resource_info();
    Json(HealthResponse {
        status: if info.degraded { "degraded" } else { "ok" }.to_string(),
        version: state.api_version.clone(),
        build: version::get_version_info(),
        model_id: info.model_id.clone(),
        backend: info.backend.to_string(),
        degraded: info.degraded,
        fallback_reason: info.fallback_reason.clone(),
        accepting: state.arbiter.is_accepting(),
        start_time: state.start_time,
        uptime_secs: (Utc::now() - state.start_time).num_seconds(),
        max_queue_depth: state.arbiter.max_queue_depth(),
        queue: state.arbiter.stats(),
    })
}

/// Serve until `shutdown` is cancelled. In-flight HTTP requests are allowed
/// to finish; the caller drains the arbiter afterwards.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = build_router(state);
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("API server listening on {}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
