//! Correlator properties: settlement in any order, no cross-talk, uniform
//! rejection on transport loss.

use serde_json::json;
use sqlbridge::client::JobRegistry;

#[tokio::test]
async fn test_settling_in_any_permutation_resolves_own_outcome() {
    // Settle N jobs in several orders; each receiver must see exactly the
    // outcome addressed to its own idx.
    let orders: [[usize; 4]; 3] = [[0, 1, 2, 3], [3, 2, 1, 0], [2, 0, 3, 1]];

    for order in orders {
        let registry = JobRegistry::new();
        let mut jobs = Vec::new();
        for _ in 0..4 {
            jobs.push(registry.allocate().await.unwrap());
        }

        for &slot in &order {
            let idx = jobs[slot].0;
            registry.settle(idx, Ok(json!({ "job": idx }))).await;
        }

        for (idx, rx) in jobs {
            let outcome = rx.await.unwrap().unwrap();
            assert_eq!(outcome, json!({ "job": idx }));
        }
        assert_eq!(registry.pending_count().await, 0);
    }
}

#[tokio::test]
async fn test_transport_close_rejects_every_pending_job() {
    let registry = JobRegistry::new();
    let (_i1, rx1) = registry.allocate().await.unwrap();
    let (_i2, rx2) = registry.allocate().await.unwrap();
    let (_i3, rx3) = registry.allocate().await.unwrap();

    registry.cancel_all("worker process exited unexpectedly").await;

    for rx in [rx1, rx2, rx3] {
        let err = rx.await.unwrap().unwrap_err();
        assert!(err.is_transport_closed());
        assert!(err.to_string().contains("worker process exited"));
    }
    assert_eq!(registry.pending_count().await, 0);
    assert!(registry.is_closed().await);
}

#[tokio::test]
async fn test_concurrent_allocation_and_settlement() {
    use std::sync::Arc;

    let registry = Arc::new(JobRegistry::new());
    let mut handles = Vec::new();

    for _ in 0..32 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            let (idx, rx) = registry.allocate().await.unwrap();
            let settler = {
                let registry = registry.clone();
                tokio::spawn(async move {
                    registry.settle(idx, Ok(json!(idx))).await;
                })
            };
            let outcome = rx.await.unwrap().unwrap();
            settler.await.unwrap();
            assert_eq!(outcome, json!(idx));
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(registry.pending_count().await, 0);
}

#[tokio::test]
async fn test_idx_reuse_after_settlement_is_safe() {
    // Settled ids leave the registry entirely; a duplicate response for an
    // already-settled idx is ignored rather than delivered anywhere.
    let registry = JobRegistry::new();
    let (idx, rx) = registry.allocate().await.unwrap();
    registry.settle(idx, Ok(json!("first"))).await;
    assert_eq!(rx.await.unwrap().unwrap(), json!("first"));

    registry.settle(idx, Ok(json!("duplicate"))).await;
    assert_eq!(registry.pending_count().await, 0);
}
