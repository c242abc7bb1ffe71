// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Failure isolation: a failing or panicking generation affects only its own ticket

use diffusion_gateway::arbiter::GenerationOutcome;

use crate::common::{request, Harness, FAIL, PANIC};

#[tokio::test]
async fn test_failure_is_reported_to_its_ticket_only() {
    let harness = Harness::new(None);
    let bad = harness
        .arbiter
        .submit(request(&format!("broken {}", FAIL)))
        .unwrap();
    let good = harness.arbiter.submit(request("a clean render")).unwrap();

    match harness.arbiter.wait(&bad).await {
        GenerationOutcome::Failed(message) => assert!(message.contains("scripted failure")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(harness.arbiter.wait(&good).await.is_success());

    let stats = harness.arbiter.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);
}

#[tokio::test]
async fn test_pipeline_panic_does_not_kill_worker() {
    let harness = Harness::new(None);
    let crashing = harness
        .arbiter
        .submit(request(&format!("crash {}", PANIC)))
        .unwrap();
    let after = harness.arbiter.submit(request("after the crash")).unwrap();

    match harness.arbiter.wait(&crashing).await {
        GenerationOutcome::Failed(message) => assert!(message.contains("panicked")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(harness.arbiter.wait(&after).await.is_success());
    assert!(harness.arbiter.is_accepting());
}

#[tokio::test]
async fn test_failed_ticket_leaves_no_record() {
    let harness = Harness::new(None);
    let bad = harness
        .arbiter
        .submit(request(&format!("broken {}", FAIL)))
        .unwrap();
    harness.arbiter.wait(&bad).await;

    assert_eq!(harness.arbiter.ticket_count(), 0);
    assert_eq!(harness.arbiter.queue_depth(), 0);
    assert_eq!(harness.arbiter.stats().executing, 0);
}
