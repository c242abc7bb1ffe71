// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the diffusion gateway

/// Full version string with feature description
pub const VERSION: &str = "v1.0.0-single-flight-2026-10-19";

/// Semantic version number
pub const VERSION_NUMBER: &str = "1.0.0";

/// Build date
pub const BUILD_DATE: &str = "2026-10-19";

/// Supported features in this version
pub const FEATURES: &[&str] = &[
    "rest-generate",
    "websocket-generate",
    "fail-closed-moderation",
    "llm-moderation-stage",
    "single-flight-arbiter",
    "fifo-queue",
    "queue-backpressure",
    "non-preemptive-cancellation",
    "cpu-fallback",
];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("Diffusion Gateway {} ({})", VERSION_NUMBER, BUILD_DATE)
}

/// Build details reported by `/health`
pub fn get_version_info() -> serde_json::Value {
    serde_json::json!({
        "version": VERSION_NUMBER,
        "build": VERSION,
        "date": BUILD_DATE,
        "features": FEATURES,
    })
}
