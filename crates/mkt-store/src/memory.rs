//! In-process store with the same semantics as the Postgres adapter.
//!
//! A single async lock guards all state, so every operation (including the
//! compare-and-swap) is atomic with respect to every other.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{EntityStore, Query, SortOrder, StoreError, StoredRow};

#[derive(Default)]
struct Inner {
    rows: HashMap<(String, Uuid), StoredRow>,
    sessions: HashMap<String, String>,
    next_seq: i64,
    last_created_at: Option<DateTime<Utc>>,
}

impl Inner {
    /// Insertion timestamps never go backwards even if the wall clock does.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_created_at = Some(ts);
        ts
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bearer credential. Session issuance lives upstream; this
    /// exists for dev setups and tests.
    pub async fn insert_session(&self, token: impl Into<String>, user_id: impl Into<String>) {
        let mut inner = self.inner.write().await;
        inner.sessions.insert(token.into(), user_id.into());
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, class: &str, id: Uuid) -> Result<Option<StoredRow>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.rows.get(&(class.to_string(), id)).cloned())
    }

    async fn insert(&self, class: &str, id: Uuid, body: Value) -> Result<StoredRow, StoreError> {
        let mut inner = self.inner.write().await;
        let key = (class.to_string(), id);
        if inner.rows.contains_key(&key) {
            return Err(StoreError::Duplicate {
                class: class.to_string(),
                id,
            });
        }

        inner.next_seq += 1;
        let seq = inner.next_seq;
        let ts = inner.stamp();
        let row = StoredRow {
            class: class.to_string(),
            id,
            version: 1,
            seq,
            created_at: ts,
            updated_at: ts,
            body,
        };
        inner.rows.insert(key, row.clone());
        Ok(row)
    }

    async fn put_if_version(
        &self,
        class: &str,
        id: Uuid,
        expected_version: i64,
        body: Value,
    ) -> Result<StoredRow, StoreError> {
        let mut inner = self.inner.write().await;
        let mismatch = || StoreError::VersionMismatch {
            class: class.to_string(),
            id,
        };

        let row = inner
            .rows
            .get_mut(&(class.to_string(), id))
            .ok_or_else(mismatch)?;
        if row.version != expected_version {
            return Err(mismatch());
        }

        row.version += 1;
        row.updated_at = Utc::now().max(row.created_at);
        row.body = body;
        Ok(row.clone())
    }

    async fn query(&self, query: &Query) -> Result<Vec<StoredRow>, StoreError> {
        let inner = self.inner.read().await;
        let mut hits: Vec<StoredRow> = inner
            .rows
            .values()
            .filter(|r| r.class == query.class)
            .filter(|r| query.filter.as_ref().map_or(true, |f| f.matches(&r.body)))
            .cloned()
            .collect();

        hits.sort_by_key(|r| r.seq);
        if query.order == SortOrder::Descending {
            hits.reverse();
        }

        let skip = query.page.skip as usize;
        let out = match query.page.limit {
            Some(limit) => hits.into_iter().skip(skip).take(limit as usize).collect(),
            None => hits.into_iter().skip(skip).collect(),
        };
        Ok(out)
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<String>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.sessions.get(token).cloned())
    }
}
