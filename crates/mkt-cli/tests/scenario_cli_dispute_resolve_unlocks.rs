use std::sync::Arc;

use mkt_orders::{NewDispute, NewOrder, OrderService, TransitionPolicy};
use mkt_schemas::{Amount, LineItem, OrderStatus};
use mkt_store::{PgStore, Repository};
use predicates::prelude::*;

/// `mkt dispute resolve` clears the lock and leaves status alone.
///
/// DB-backed test, skipped if MKT_DATABASE_URL is not set.
#[allow(deprecated)]
#[tokio::test]
async fn cli_dispute_resolve_unlocks_order() -> anyhow::Result<()> {
    let url = match std::env::var(mkt_store::ENV_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: MKT_DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = match mkt_store::connect(&url, 2).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("SKIP: cannot connect to DB: {e}");
            return Ok(());
        }
    };
    mkt_store::migrate(&pool).await?;

    let svc = OrderService::new(
        Repository::new(Arc::new(PgStore::new(pool))),
        TransitionPolicy::default(),
    );
    let order = svc
        .create_order(
            "cli-buyer",
            NewOrder {
                vendor_id: "cli-vendor".to_string(),
                items: vec![LineItem {
                    product_id: "sku".to_string(),
                    quantity: 1,
                }],
                total: Amount::from_major(10.0)?,
            },
        )
        .await?;
    let order_id = order.record.id;
    svc.request_transition("cli-vendor", order_id, OrderStatus::Processing, None)
        .await?;
    let dispute = svc
        .open_dispute(
            "cli-buyer",
            order_id,
            NewDispute {
                reason: "late".to_string(),
                description: String::new(),
                amount_requested: Amount::from_major(1.0)?,
            },
        )
        .await?;

    assert_cmd::Command::cargo_bin("mkt")?
        .env(mkt_store::ENV_DB_URL, &url)
        .args([
            "dispute",
            "resolve",
            "--dispute-id",
            &dispute.record.id.to_string(),
            "--resolution",
            "partial refund",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("resolved=true"));

    assert_cmd::Command::cargo_bin("mkt")?
        .env(mkt_store::ENV_DB_URL, &url)
        .args(["order", "show", "--order-id", &order_id.to_string()])
        .assert()
        .success()
        .stdout(predicate::str::contains("status=processing"))
        .stdout(predicate::str::contains("open_dispute_id=NONE"))
        .stdout(predicate::str::contains("history_valid=true"));

    svc.request_transition("cli-vendor", order_id, OrderStatus::Shipped, None)
        .await?;
    Ok(())
}
