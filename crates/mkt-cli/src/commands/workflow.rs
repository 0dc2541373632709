//! `mkt order` and `mkt dispute` handlers.

use anyhow::Result;
use mkt_orders::verify_history;

use super::{parse_uuid, Workflow};

pub async fn order_show(ctx: &Workflow, order_id: &str) -> Result<()> {
    let id = parse_uuid("order_id", order_id)?;
    let stored = ctx.orders.load_order(id).await?;
    let o = &stored.record;

    println!("order_id={}", o.id);
    println!("buyer_id={}", o.buyer_id);
    println!("vendor_id={}", o.vendor_id);
    println!("status={}", o.status);
    println!("total={}", o.total);
    println!("items={}", o.items.len());
    println!(
        "open_dispute_id={}",
        o.open_dispute_id
            .map(|d| d.to_string())
            .unwrap_or_else(|| "NONE".to_string())
    );
    println!("created_at_utc={}", stored.created_at.to_rfc3339());
    println!("updated_at_utc={}", stored.updated_at.to_rfc3339());
    for (i, h) in o.status_history.iter().enumerate() {
        println!(
            "history[{i}]={} -> {} by={} at={} note={}",
            h.from,
            h.to,
            h.by,
            h.at.to_rfc3339(),
            h.note.as_deref().unwrap_or("")
        );
    }
    match verify_history(o) {
        Ok(()) => println!("history_valid=true"),
        Err(e) => println!("history_valid=false reason={e}"),
    }
    Ok(())
}

pub async fn dispute_resolve(ctx: &Workflow, dispute_id: &str, resolution: &str) -> Result<()> {
    let id = parse_uuid("dispute_id", dispute_id)?;
    let resolved = ctx.orders.resolve_dispute(id, resolution).await?;
    println!(
        "resolved=true dispute_id={} order_id={} order_unlocked=true",
        resolved.record.id, resolved.record.order_id
    );
    Ok(())
}
