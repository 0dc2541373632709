//! Racing requests on one order serialize on the order's version.

use std::sync::Arc;
use std::time::Duration;

use mkt_orders::verify_history;
use mkt_schemas::{Dispute, OrderStatus, ServiceError};
use mkt_store::{Filter, Page, Repository, SortOrder};
use mkt_testkit::{dispute_request, Harness};
use uuid::Uuid;

/// Transition and dispute-open issued together: the dispute always lands, and
/// the transition either committed before the lock or was refused.
#[tokio::test]
async fn transition_and_dispute_open_never_both_win_against_one_version() {
    for _ in 0..10 {
        let h = Arc::new(Harness::racy(Duration::from_millis(15)));
        let id = h.place_order("B", "V").await;

        let t = {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                h.orders
                    .request_transition("V", id, OrderStatus::Processing, None)
                    .await
            })
        };
        let d = {
            let h = Arc::clone(&h);
            tokio::spawn(async move {
                h.orders
                    .open_dispute("B", id, dispute_request("race"))
                    .await
            })
        };
        let transition = t.await.unwrap();
        let dispute = d.await.unwrap().expect("dispute open must succeed");

        let order = h.order(id).await.record;
        assert_eq!(order.open_dispute_id, Some(dispute.record.id));
        verify_history(&order).unwrap();

        match transition {
            Ok(_) => {
                assert_eq!(order.status, OrderStatus::Processing);
                assert_eq!(order.status_history.len(), 1);
            }
            Err(e) => {
                assert!(matches!(e, ServiceError::Conflict(_)), "got {e}");
                assert_eq!(order.status, OrderStatus::New);
                assert!(order.status_history.is_empty());
            }
        }

        // Whatever happened, the lock now holds.
        let err = h
            .orders
            .request_transition("V", id, OrderStatus::Cancelled, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }
}

/// Identical concurrent transitions: exactly one applies.
#[tokio::test]
async fn duplicate_transition_requests_apply_once() {
    let h = Arc::new(Harness::racy(Duration::from_millis(10)));
    let id = h.place_order("B", "V").await;

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let h = Arc::clone(&h);
        tasks.push(tokio::spawn(async move {
            h.orders
                .request_transition("V", id, OrderStatus::Processing, None)
                .await
        }));
    }

    let mut wins = 0;
    for t in tasks {
        match t.await.unwrap() {
            Ok(_) => wins += 1,
            Err(ServiceError::Conflict(_)) | Err(ServiceError::InvalidTransition { .. }) => {}
            Err(e) => panic!("unexpected error {e}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(h.order(id).await.record.status_history.len(), 1);
}

/// Two buyers' worth of concurrent dispute opens: one dispute, one lock.
#[tokio::test]
async fn concurrent_dispute_opens_yield_a_single_lock() {
    let h = Arc::new(Harness::racy(Duration::from_millis(10)));
    let id = h.place_order("B", "V").await;

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let h = Arc::clone(&h);
        tasks.push(tokio::spawn(async move {
            h.orders.open_dispute("B", id, dispute_request("dup")).await
        }));
    }

    let mut opened = Vec::new();
    for t in tasks {
        match t.await.unwrap() {
            Ok(d) => opened.push(d.record.id),
            Err(ServiceError::Conflict(_)) => {}
            Err(e) => panic!("unexpected error {e}"),
        }
    }
    assert_eq!(opened.len(), 1);
    assert_eq!(h.order(id).await.record.open_dispute_id, Some(opened[0]));

    // Losers withdrew their records; only the lock holder is still open.
    let still_open: Vec<Uuid> = Repository::new(h.store.clone())
        .find::<Dispute>(
            Filter::eq("orderId", id.to_string()),
            SortOrder::Ascending,
            Page::all(),
        )
        .await
        .unwrap()
        .into_iter()
        .filter(|d| d.record.is_open())
        .map(|d| d.record.id)
        .collect();
    assert_eq!(still_open, opened);
}
