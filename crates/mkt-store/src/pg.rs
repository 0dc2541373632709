//! Postgres adapter.
//!
//! One `entities` table holds every record class as JSONB; conditional writes
//! are `UPDATE ... WHERE version = $expected`, so Postgres row locking makes
//! the compare-and-swap atomic without an explicit transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{EntityStore, Query, SortOrder, StoreError, StoredRow};

const ROW_COLUMNS: &str = "class, id, version, seq, created_at, updated_at, body";

/// Connect to Postgres with an explicit URL (resolved by the caller from
/// config; this crate never reads the environment).
pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_entities_table: bool,
}

/// Connectivity + schema presence.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='entities'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_entities_table: exists,
    })
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Register a bearer credential (dev setups and tests).
    pub async fn insert_session(&self, token: &str, user_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            insert into sessions (token, user_id) values ($1, $2)
            on conflict (token) do update set user_id = excluded.user_id
            "#,
        )
        .bind(token)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(())
    }
}

fn decode_row(row: &PgRow) -> Result<StoredRow, StoreError> {
    let decode = |e: sqlx::Error| StoreError::Corrupt(e.to_string());
    Ok(StoredRow {
        class: row.try_get("class").map_err(decode)?,
        id: row.try_get("id").map_err(decode)?,
        version: row.try_get("version").map_err(decode)?,
        seq: row.try_get("seq").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        updated_at: row.try_get("updated_at").map_err(decode)?,
        body: row.try_get("body").map_err(decode)?,
    })
}

/// Classify driver errors: connectivity problems are transient, everything
/// else is surfaced as-is.
fn map_sqlx(e: sqlx::Error) -> StoreError {
    match &e {
        sqlx::Error::PoolTimedOut => StoreError::Timeout("pool acquire"),
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(e.to_string()),
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            // 08xxx connection exceptions, 57P0x operator intervention / shutdown,
            // 40001 serialization failure, 53xxx insufficient resources.
            if code.starts_with("08")
                || code.starts_with("57P")
                || code.starts_with("53")
                || code == "40001"
            {
                StoreError::Unavailable(e.to_string())
            } else {
                StoreError::Backend(e.to_string())
            }
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(e.to_string())
        }
        _ => StoreError::Backend(e.to_string()),
    }
}

#[async_trait]
impl EntityStore for PgStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn get(&self, class: &str, id: Uuid) -> Result<Option<StoredRow>, StoreError> {
        let sql = format!("select {ROW_COLUMNS} from entities where class = $1 and id = $2");
        let row = sqlx::query(&sql)
            .bind(class)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
        row.as_ref().map(decode_row).transpose()
    }

    async fn insert(&self, class: &str, id: Uuid, body: Value) -> Result<StoredRow, StoreError> {
        let sql = format!(
            r#"
            insert into entities (class, id, body) values ($1, $2, $3)
            on conflict (class, id) do nothing
            returning {ROW_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(class)
            .bind(id)
            .bind(&body)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        match row {
            Some(r) => decode_row(&r),
            None => Err(StoreError::Duplicate {
                class: class.to_string(),
                id,
            }),
        }
    }

    async fn put_if_version(
        &self,
        class: &str,
        id: Uuid,
        expected_version: i64,
        body: Value,
    ) -> Result<StoredRow, StoreError> {
        let sql = format!(
            r#"
            update entities
            set body = $4,
                version = version + 1,
                updated_at = clock_timestamp()
            where class = $1 and id = $2 and version = $3
            returning {ROW_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(class)
            .bind(id)
            .bind(expected_version)
            .bind(&body)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;

        match row {
            Some(r) => decode_row(&r),
            None => Err(StoreError::VersionMismatch {
                class: class.to_string(),
                id,
            }),
        }
    }

    async fn query(&self, query: &Query) -> Result<Vec<StoredRow>, StoreError> {
        let direction = match query.order {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        };
        // `body @> '{}'` is true for every object, so an absent filter needs no
        // separate statement.
        let containment = query
            .filter
            .as_ref()
            .map(|f| f.containment_doc())
            .unwrap_or_else(|| Value::Object(Default::default()));

        let sql = format!(
            r#"
            select {ROW_COLUMNS}
            from entities
            where class = $1 and body @> $2
            order by seq {direction}
            limit $3 offset $4
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(&query.class)
            .bind(&containment)
            .bind(query.page.limit.map(i64::from))
            .bind(i64::from(query.page.skip))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;

        rows.iter().map(decode_row).collect()
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<String>, StoreError> {
        let row = sqlx::query(
            r#"
            select user_id from sessions
            where token = $1 and (expires_at is null or expires_at > now())
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        row.map(|r| r.try_get::<String, _>("user_id"))
            .transpose()
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}
