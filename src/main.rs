// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use diffusion_gateway::{
    api::{self, Admission, AppState},
    arbiter::GenerationArbiter,
    config::Settings,
    diffusion::InferenceResource,
    version,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let settings = Settings::parse();

    // Initialize tracing subscriber for logging
    let default_level = if settings.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    settings.validate()?;
    tracing::info!("Starting {}", version::get_version_string());

    let gate = Arc::new(settings.build_gate()?);
    tracing::info!(
        safety_level = ?settings.safety_level,
        classifier_stage = settings.moderation_endpoint.is_some(),
        "Content gate ready"
    );

    let resource = InferenceResource::initialize(&settings.resource_config()).await;
    let arbiter = Arc::new(
        GenerationArbiter::start(resource, settings.arbiter_config())
            .context("failed to start generation worker")?,
    );

    let admission = Arc::new(Admission::new(
        gate,
        Arc::clone(&arbiter),
        settings.request_timeout(),
    ));
    let state = AppState::new(admission, settings.max_request_bytes, settings.api_version.clone());

    let addr = settings.listen_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.cancel();
    });

    api::serve(listener, state, shutdown).await?;

    arbiter.shutdown().await;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
