//! Timeout and bounded-retry wrapper for any [`EntityStore`].
//!
//! - Every call is bounded by `RetryPolicy::timeout`.
//! - Idempotent reads (`get`, `query`, `resolve_session`) are retried up to
//!   `read_retries` extra times on transient errors, with doubling backoff.
//! - Writes are never retried. A conditional write that loses is a business
//!   `Conflict`; a write that times out may or may not have committed, and a
//!   blind retry could apply it twice.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mkt_config::StoreSection;
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::{EntityStore, Query, StoreError, StoredRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub read_retries: u32,
    pub initial_backoff: Duration,
}

impl From<&StoreSection> for RetryPolicy {
    fn from(cfg: &StoreSection) -> Self {
        Self {
            timeout: Duration::from_millis(cfg.timeout_ms),
            read_retries: cfg.read_retries,
            initial_backoff: Duration::from_millis(cfg.retry_backoff_ms),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            read_retries: 3,
            initial_backoff: Duration::from_millis(50),
        }
    }
}

pub struct ResilientStore {
    inner: Arc<dyn EntityStore>,
    policy: RetryPolicy,
}

impl ResilientStore {
    pub fn new(inner: Arc<dyn EntityStore>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    async fn bounded<T, Fut>(&self, op: &'static str, fut: Fut) -> Result<T, StoreError>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        match tokio::time::timeout(self.policy.timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(StoreError::Timeout(op)),
        }
    }

    async fn read<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;
        let mut delay = self.policy.initial_backoff;
        loop {
            match self.bounded(op, call()).await {
                Err(e) if e.is_transient() && attempt < self.policy.read_retries => {
                    attempt += 1;
                    warn!(
                        store = self.inner.name(),
                        op,
                        attempt,
                        error = %e,
                        "transient store error; retrying read"
                    );
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl EntityStore for ResilientStore {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    async fn get(&self, class: &str, id: Uuid) -> Result<Option<StoredRow>, StoreError> {
        self.read("get", || self.inner.get(class, id)).await
    }

    async fn insert(&self, class: &str, id: Uuid, body: Value) -> Result<StoredRow, StoreError> {
        self.bounded("insert", self.inner.insert(class, id, body))
            .await
    }

    async fn put_if_version(
        &self,
        class: &str,
        id: Uuid,
        expected_version: i64,
        body: Value,
    ) -> Result<StoredRow, StoreError> {
        self.bounded(
            "put_if_version",
            self.inner.put_if_version(class, id, expected_version, body),
        )
        .await
    }

    async fn query(&self, query: &Query) -> Result<Vec<StoredRow>, StoreError> {
        self.read("query", || self.inner.query(query)).await
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<String>, StoreError> {
        self.read("resolve_session", || self.inner.resolve_session(token))
            .await
    }
}
