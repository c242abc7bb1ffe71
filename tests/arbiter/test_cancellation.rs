// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Cancellation of queued and executing tickets

use diffusion_gateway::arbiter::{CancelResult, GenerationOutcome};

use crate::common::{eventually, request, Harness, HOLD};

#[tokio::test]
async fn test_cancel_queued_ticket_never_reaches_resource() {
    let harness = Harness::new(None);
    let running = harness
        .arbiter
        .submit(request(&format!("running {}", HOLD)))
        .unwrap();
    harness.wait_for_started(1).await;

    let doomed = harness.arbiter.submit(request("never rendered")).unwrap();
    let survivor = harness.arbiter.submit(request("rendered after")).unwrap();
    assert_eq!(harness.arbiter.queue_depth(), 2);

    assert_eq!(harness.arbiter.cancel(&doomed), CancelResult::Dequeued);
    assert_eq!(harness.arbiter.queue_depth(), 1);
    assert_eq!(harness.arbiter.wait(&doomed).await, GenerationOutcome::Cancelled);

    harness.release();
    assert!(harness.arbiter.wait(&running).await.is_success());
    assert!(harness.arbiter.wait(&survivor).await.is_success());

    let started = harness.probe.started();
    assert!(!started.iter().any(|p| p == "never rendered"));
    assert_eq!(started.len(), 2);
    assert_eq!(harness.arbiter.stats().cancelled, 1);
}

#[tokio::test]
async fn test_cancel_executing_ticket_releases_caller_but_not_resource() {
    let harness = Harness::new(None);
    let executing = harness
        .arbiter
        .submit(request(&format!("long render {}", HOLD)))
        .unwrap();
    harness.wait_for_started(1).await;
    let next = harness.arbiter.submit(request("next in line")).unwrap();

    assert_eq!(harness.arbiter.cancel(&executing), CancelResult::Detached);
    // The caller is answered before the generation finishes
    assert_eq!(harness.arbiter.wait(&executing).await, GenerationOutcome::Cancelled);
    assert!(harness.probe.finished().is_empty());

    // The next ticket cannot start until the cancelled one really ends
    assert_eq!(harness.arbiter.stats().executing, 1);
    assert_eq!(harness.probe.calls(), 1);

    harness.release();
    assert!(harness.arbiter.wait(&next).await.is_success());

    let stats = harness.arbiter.stats();
    assert_eq!(stats.discarded, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(harness.probe.max_active(), 1);
    assert_eq!(
        harness.probe.finished(),
        vec![format!("long render {}", HOLD), "next in line".to_string()]
    );
}

#[tokio::test]
async fn test_cancelled_result_is_never_delivered() {
    let harness = Harness::new(None);
    let handle = harness
        .arbiter
        .submit(request(&format!("discard me {}", HOLD)))
        .unwrap();
    harness.wait_for_started(1).await;

    harness.arbiter.cancel(&handle);
    harness.release();

    let probe = harness.probe.clone();
    eventually(move || probe.finished().len() == 1).await;
    eventually(|| harness.arbiter.stats().discarded == 1).await;

    assert_eq!(handle.try_outcome(), Some(GenerationOutcome::Cancelled));
    assert_eq!(harness.arbiter.ticket_count(), 0);
}

#[tokio::test]
async fn test_cancel_after_completion_is_a_no_op() {
    let harness = Harness::new(None);
    let handle = harness.arbiter.submit(request("already done")).unwrap();
    assert!(harness.arbiter.wait(&handle).await.is_success());

    assert_eq!(harness.arbiter.cancel(&handle), CancelResult::AlreadyResolved);
    assert!(harness.arbiter.wait(&handle).await.is_success());
    assert_eq!(harness.arbiter.stats().cancelled, 0);
}

#[tokio::test]
async fn test_double_cancel_of_executing_ticket() {
    let harness = Harness::new(None);
    let handle = harness
        .arbiter
        .submit(request(&format!("twice {}", HOLD)))
        .unwrap();
    harness.wait_for_started(1).await;

    assert_eq!(harness.arbiter.cancel(&handle), CancelResult::Detached);
    assert_eq!(harness.arbiter.cancel(&handle), CancelResult::AlreadyResolved);
    assert_eq!(harness.arbiter.stats().cancelled, 1);

    harness.release();
}
