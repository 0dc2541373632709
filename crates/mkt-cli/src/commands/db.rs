//! `mkt db` handlers.

use anyhow::Result;
use sqlx::PgPool;

pub async fn status(pool: &PgPool) -> Result<()> {
    let s = mkt_store::status(pool).await?;
    println!("db_ok={} has_entities_table={}", s.ok, s.has_entities_table);
    Ok(())
}

pub async fn migrate(pool: &PgPool) -> Result<()> {
    mkt_store::migrate(pool).await?;
    println!("migrations_applied=true");
    Ok(())
}
