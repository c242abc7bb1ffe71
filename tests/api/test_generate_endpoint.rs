// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! POST /generate

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use diffusion_gateway::api::{build_router, GenerationResponse};
use diffusion_gateway::diffusion::ContentGate;
use serde_json::json;
use tower::ServiceExt; // for `oneshot`

use crate::common::{eventually, keyword_gate, request, Harness, UnavailableModerator, FAIL, HOLD};

fn post_generate(body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate")
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

async fn call(app: Router, req: Request<Body>) -> (StatusCode, GenerationResponse) {
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let envelope: GenerationResponse = serde_json::from_slice(&body_bytes)
        .unwrap_or_else(|e| panic!("body is not a response envelope ({}): {:?}", e, body_bytes));
    (status, envelope)
}

#[tokio::test]
async fn test_generate_success_returns_data_url() {
    let harness = Harness::new(None);
    let app = build_router(harness.app_state());

    let body = json!({ "prompt": "a lighthouse at dusk", "steps": 20, "guidance_scale": 6.0 });
    let (status, envelope) = call(app, post_generate(body.to_string())).await;

    assert_eq!(status, StatusCode::OK);
    assert!(envelope.is_success());
    let url = envelope.image_url.expect("image_url present on success");
    assert!(url.starts_with("data:image/png;base64,"));
    assert!(envelope.error.is_none());
    assert!(envelope.error_type.is_none());
}

#[tokio::test]
async fn test_original_client_field_names_accepted() {
    let harness = Harness::new(None);
    let app = build_router(harness.app_state());

    let body = json!({
        "prompt": "a lighthouse at dusk",
        "negative_prompt": "",
        "num_inference_steps": 25,
        "guidance_scale": 7.5
    });
    let (status, envelope) = call(app, post_generate(body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert!(envelope.is_success());
}

#[tokio::test]
async fn test_validation_error_does_not_touch_queue() {
    let harness = Harness::new(None);
    let app = build_router(harness.app_state());

    let body = json!({ "prompt": "a cat", "steps": 0 });
    let (status, envelope) = call(app, post_generate(body.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope.error_type.as_deref(), Some("validation_error"));
    assert!(envelope.error.unwrap().contains("steps"));
    assert_eq!(harness.arbiter.stats().submitted, 0);
}

#[tokio::test]
async fn test_whole_float_steps_accepted() {
    let harness = Harness::new(None);
    let app = build_router(harness.app_state());

    let (status, envelope) =
        call(app, post_generate(r#"{"prompt": "a lighthouse", "steps": 10.0}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(envelope.is_success());
}

#[tokio::test]
async fn test_fractional_steps_is_a_validation_error() {
    let harness = Harness::new(None);
    let app = build_router(harness.app_state());

    let (status, envelope) =
        call(app, post_generate(r#"{"prompt": "a lighthouse", "steps": 10.5}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope.error_type.as_deref(), Some("validation_error"));
    assert!(envelope.error.unwrap().contains("steps"));
    assert_eq!(harness.arbiter.stats().submitted, 0);
}

#[tokio::test]
async fn test_blank_prompt_is_rejected() {
    let harness = Harness::new(None);
    let app = build_router(harness.app_state());

    let (status, envelope) = call(app, post_generate(r#"{"prompt": "   "}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope.error_type.as_deref(), Some("validation_error"));
}

#[tokio::test]
async fn test_moderation_rejection_leaves_queue_unchanged() {
    let harness = Harness::new(None);
    let running = harness
        .arbiter
        .submit(request(&format!("running {}", HOLD)))
        .unwrap();
    harness.wait_for_started(1).await;
    let depth_before = harness.arbiter.queue_depth();

    let app = build_router(harness.app_state());
    let body = json!({ "prompt": "a nude figure study" });
    let (status, envelope) = call(app, post_generate(body.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope.error.as_deref(), Some("content rejected"));
    assert_eq!(envelope.error_type.as_deref(), Some("content_rejected"));
    assert_eq!(harness.arbiter.queue_depth(), depth_before);
    assert_eq!(harness.arbiter.stats().submitted, 1);

    harness.release();
    assert!(harness.arbiter.wait(&running).await.is_success());
    assert_eq!(harness.probe.calls(), 1);
}

#[tokio::test]
async fn test_moderation_outage_fails_closed() {
    let harness = Harness::new(None);
    let gate = ContentGate::new(Arc::new(UnavailableModerator));
    let app = build_router(harness.app_state_with(gate, None));

    let body = json!({ "prompt": "a perfectly harmless teapot" });
    let (status, envelope) = call(app, post_generate(body.to_string())).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope.error.as_deref(), Some("content rejected"));
    assert_eq!(harness.arbiter.stats().submitted, 0);
    assert_eq!(harness.probe.calls(), 0);
}

#[tokio::test]
async fn test_malformed_json_gets_envelope() {
    let harness = Harness::new(None);
    let app = build_router(harness.app_state());

    let (status, envelope) = call(app, post_generate("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(envelope.error_type.as_deref(), Some("invalid_request"));
    assert!(!envelope.is_success());
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let harness = Harness::new(None);
    let app = build_router(harness.app_state());

    let body = json!({ "prompt": "a".repeat(100 * 1024) });
    let (status, envelope) = call(app, post_generate(body.to_string())).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(envelope.error_type.as_deref(), Some("payload_too_large"));
}

#[tokio::test]
async fn test_generation_failure_is_500() {
    let harness = Harness::new(None);
    let app = build_router(harness.app_state());

    let body = json!({ "prompt": format!("a broken render {}", FAIL) });
    let (status, envelope) = call(app, post_generate(body.to_string())).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(envelope.error_type.as_deref(), Some("generation_failed"));
    assert!(envelope.error.unwrap().starts_with("Image generation failed"));
}

#[tokio::test]
async fn test_overloaded_queue_is_503() {
    let harness = Harness::new(Some(1));
    let _running = harness
        .arbiter
        .submit(request(&format!("running {}", HOLD)))
        .unwrap();
    harness.wait_for_started(1).await;
    let _queued = harness.arbiter.submit(request("queued")).unwrap();

    let app = build_router(harness.app_state());
    let body = json!({ "prompt": "one more" });
    let (status, envelope) = call(app, post_generate(body.to_string())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(envelope.error_type.as_deref(), Some("overloaded"));
    harness.release();
}

#[tokio::test]
async fn test_timeout_stops_waiting_without_cancelling() {
    let harness = Harness::new(None);
    let app = build_router(harness.app_state_with(keyword_gate(), Some(Duration::from_millis(50))));

    let body = json!({ "prompt": format!("slow render {}", HOLD) });
    let (status, envelope) = call(app, post_generate(body.to_string())).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(envelope.error_type.as_deref(), Some("timeout"));

    // The ticket keeps running and completes normally
    harness.release();
    eventually(|| harness.arbiter.stats().completed == 1).await;
    assert_eq!(harness.arbiter.stats().cancelled, 0);
    assert_eq!(harness.arbiter.stats().discarded, 0);
}

#[tokio::test]
async fn test_client_going_away_cancels_queued_ticket() {
    let harness = Harness::new(None);
    let _running = harness
        .arbiter
        .submit(request(&format!("running {}", HOLD)))
        .unwrap();
    harness.wait_for_started(1).await;

    let app = build_router(harness.app_state());
    let body = json!({ "prompt": "abandoned request" });
    let task = tokio::spawn(async move { app.oneshot(post_generate(body.to_string())).await });

    eventually(|| harness.arbiter.queue_depth() == 1).await;
    task.abort();

    eventually(|| harness.arbiter.queue_depth() == 0).await;
    assert_eq!(harness.arbiter.stats().cancelled, 1);

    harness.release();
    eventually(|| harness.arbiter.ticket_count() == 0).await;
    assert!(!harness
        .probe
        .started()
        .contains(&"abandoned request".to_string()));
}
