// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Queue depth limit

use diffusion_gateway::arbiter::SubmitError;

use crate::common::{request, Harness, HOLD};

#[tokio::test]
async fn test_submit_rejected_when_queue_full() {
    let harness = Harness::new(Some(2));
    let running = harness
        .arbiter
        .submit(request(&format!("running {}", HOLD)))
        .unwrap();
    harness.wait_for_started(1).await;

    // The executing ticket does not count toward the limit
    let a = harness.arbiter.submit(request("queued a")).unwrap();
    let b = harness.arbiter.submit(request("queued b")).unwrap();

    match harness.arbiter.submit(request("one too many")) {
        Err(SubmitError::Overloaded { depth, limit }) => {
            assert_eq!(depth, 2);
            assert_eq!(limit, 2);
        }
        other => panic!("expected overload, got {:?}", other.map(|h| h.id())),
    }
    assert_eq!(harness.arbiter.queue_depth(), 2);

    harness.release();
    for handle in [&running, &a, &b] {
        assert!(harness.arbiter.wait(handle).await.is_success());
    }
    assert_eq!(harness.arbiter.stats().submitted, 3);
}

#[tokio::test]
async fn test_capacity_frees_up_after_cancel() {
    let harness = Harness::new(Some(1));
    let _running = harness
        .arbiter
        .submit(request(&format!("running {}", HOLD)))
        .unwrap();
    harness.wait_for_started(1).await;

    let queued = harness.arbiter.submit(request("queued")).unwrap();
    assert!(harness.arbiter.submit(request("rejected")).is_err());

    harness.arbiter.cancel(&queued);
    let accepted = harness.arbiter.submit(request("accepted now")).unwrap();

    harness.release();
    assert!(harness.arbiter.wait(&accepted).await.is_success());
}

#[tokio::test]
async fn test_unbounded_queue_by_default() {
    let harness = Harness::new(None);
    let _running = harness
        .arbiter
        .submit(request(&format!("running {}", HOLD)))
        .unwrap();
    harness.wait_for_started(1).await;

    let handles: Vec<_> = (0..50)
        .map(|i| harness.arbiter.submit(request(&format!("queued {}", i))).unwrap())
        .collect();
    assert_eq!(harness.arbiter.queue_depth(), 50);
    assert_eq!(harness.arbiter.max_queue_depth(), None);

    harness.release();
    for handle in &handles {
        assert!(harness.arbiter.wait(handle).await.is_success());
    }
}

#[tokio::test]
async fn test_submit_after_shutdown_is_refused() {
    let harness = Harness::new(None);
    harness.arbiter.shutdown().await;
    assert_eq!(
        harness.arbiter.submit(request("late")).unwrap_err(),
        SubmitError::ShuttingDown
    );
}
