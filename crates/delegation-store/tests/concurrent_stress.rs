//! Concurrent access tests for `DelegationStore`.
//!
//! Many tasks race to create the same delegation; the engine must let exactly
//! one through per identifier. The heavier variants are ignored by default:
//!
//! ```bash
//! cargo test -p delegation-store --test concurrent_stress -- --ignored
//! ```

#![allow(clippy::expect_used, clippy::panic)]

use std::collections::HashSet;

use chrono::Duration;
use delegation_store::{
    Clock, DelegationError, DelegationId, RenewOutcome,
    testutil::{credential_payload, delegation_id, quiet_store, request_payload},
};
use tokio::task::JoinSet;

/// Number of concurrent tasks for most tests.
const CONCURRENCY: usize = 16;

/// Number of identifiers contested in the many-rounds test.
const ROUNDS: usize = 200;

// ---------------------------------------------------------------------------
// Test: racing put_request on one identifier
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_request_puts_have_one_winner() {
    let (store, _clock) = quiet_store().await;

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let store = store.clone();
        set.spawn(async move {
            let result =
                store.put_request("abc".into(), request_payload(&format!("task{task_id}"))).await;
            (task_id, result)
        });
    }

    let mut winners = Vec::new();
    while let Some(joined) = set.join_next().await {
        let (task_id, result) = joined.expect("task should not panic");
        match result {
            Ok(_) => winners.push(task_id),
            Err(DelegationError::DuplicateDelegation { .. }) => {},
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(winners.len(), 1, "exactly one put must win, got: {winners:?}");
    let stored = store.get_request("abc").await.expect("winner is stored");
    assert!(stored.payload.request.ends_with(&format!("task{}", winners[0])));
}

// ---------------------------------------------------------------------------
// Test: racing put_credential on one identifier
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_credential_puts_have_one_winner() {
    let (store, clock) = quiet_store().await;
    let not_after = clock.now() + Duration::hours(1);

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let store = store.clone();
        set.spawn(async move {
            store
                .put_credential("xyz".into(), credential_payload(&format!("task{task_id}")), not_after)
                .await
                .is_ok()
        });
    }

    let winners = set.join_all().await.into_iter().filter(|won| *won).count();
    assert_eq!(winners, 1);
}

// ---------------------------------------------------------------------------
// Test: concurrent renewals settle on the longest validity
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_renewals_keep_latest_not_after() {
    let (store, clock) = quiet_store().await;
    let now = clock.now();

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let store = store.clone();
        let hours = i64::try_from(task_id).expect("small") + 1;
        set.spawn(async move {
            store
                .renew_credential(
                    "renew".into(),
                    credential_payload(&format!("task{task_id}")),
                    now + Duration::hours(hours),
                )
                .await
                .expect("renew should not fail")
        });
    }

    let outcomes = set.join_all().await;
    let inserted = outcomes.iter().filter(|o| **o == RenewOutcome::Inserted).count();
    assert_eq!(inserted, 1, "only the first renewal may insert");

    let held = store.get_credential("renew").await.expect("credential stored");
    let longest = i64::try_from(CONCURRENCY).expect("small");
    assert_eq!(held.not_after, now + Duration::hours(longest));
}

// ---------------------------------------------------------------------------
// Test: many contested identifiers, one winner each
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Run with --ignored
async fn many_rounds_one_winner_per_identifier() {
    let (store, _clock) = quiet_store().await;

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let store = store.clone();
        set.spawn(async move {
            let mut won = Vec::new();
            for round in 0..ROUNDS {
                let id = delegation_id(round);
                if store.put_request(id.clone(), request_payload(&format!("t{task_id}"))).await.is_ok()
                {
                    won.push(id);
                }
            }
            won
        });
    }

    let mut seen: HashSet<DelegationId> = HashSet::new();
    while let Some(joined) = set.join_next().await {
        for id in joined.expect("task should not panic") {
            assert!(seen.insert(id.clone()), "{id} was won twice");
        }
    }
    assert_eq!(seen.len(), ROUNDS);
}

// ---------------------------------------------------------------------------
// Test: put/delete churn never leaves two records
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore] // Run with --ignored
async fn put_delete_churn_stays_consistent() {
    let (store, _clock) = quiet_store().await;

    let mut set = JoinSet::new();
    for task_id in 0..CONCURRENCY {
        let store = store.clone();
        set.spawn(async move {
            for _ in 0..ROUNDS {
                match store.put_request("churn".into(), request_payload(&format!("t{task_id}"))).await {
                    Ok(_) => store.delete_request("churn").await.expect("delete"),
                    Err(DelegationError::DuplicateDelegation { .. }) => {},
                    Err(other) => panic!("unexpected error: {other:?}"),
                }
            }
        });
    }

    while let Some(joined) = set.join_next().await {
        joined.expect("task should not panic");
    }

    // Every winner deleted its own record.
    assert!(matches!(store.get_request("churn").await, Err(DelegationError::NotFound { .. })));
}
