//! mkt-store
//!
//! Entity Store Adapter boundary.
//!
//! The backing store keeps records as opaque JSON bodies keyed by
//! `(class, id)` and manages three pieces of metadata itself:
//!
//! - `version`: starts at 1, bumped on every successful write. Conditional
//!   writes ([`EntityStore::put_if_version`]) compare against it.
//! - `created_at`: assigned at insert. Informational; it follows the wall
//!   clock and does not order listings.
//! - `seq`: store-wide, strictly increasing, assigned at insert. The total
//!   ordering key for listings.
//!
//! Core crates never touch [`StoredRow`] bodies directly; they go through
//! [`Repository`], which decodes into the typed records of `mkt-schemas`.
//!
//! Implementations:
//! - [`MemoryStore`]: in-process, used by tests and the `memory` backend.
//! - [`PgStore`]: Postgres via sqlx.
//! - [`ResilientStore`]: wraps either with a timeout on every call and a
//!   bounded retry for idempotent reads.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mkt_schemas::ServiceError;
use serde_json::Value;
use uuid::Uuid;

mod memory;
mod pg;
mod repo;
mod resilient;

pub use memory::MemoryStore;
pub use pg::{connect, migrate, status, DbStatus, PgStore};
pub use repo::{Record, Repository, Stored};
pub use resilient::{ResilientStore, RetryPolicy};

/// Env var read by DB-backed tests. Binaries resolve the URL through
/// `mkt-config` instead.
pub const ENV_DB_URL: &str = "MKT_DATABASE_URL";

// ---------------------------------------------------------------------------
// Rows and queries
// ---------------------------------------------------------------------------

/// One stored record plus store-managed metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub class: String,
    pub id: Uuid,
    pub version: i64,
    pub seq: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub body: Value,
}

/// Top-level field filter over record bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `body[field] == value`
    Eq(String, Value),
    /// `body[field]` is an array containing `value`.
    Contains(String, Value),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Contains(field.into(), value.into())
    }

    /// Evaluate against a body. Used by in-process stores.
    pub fn matches(&self, body: &Value) -> bool {
        match self {
            Filter::Eq(field, value) => body.get(field) == Some(value),
            Filter::Contains(field, value) => body
                .get(field)
                .and_then(Value::as_array)
                .map(|arr| arr.contains(value))
                .unwrap_or(false),
        }
    }

    /// JSONB containment document equivalent to this filter.
    pub fn containment_doc(&self) -> Value {
        let mut doc = serde_json::Map::new();
        match self {
            Filter::Eq(field, value) => {
                doc.insert(field.clone(), value.clone());
            }
            Filter::Contains(field, value) => {
                doc.insert(field.clone(), Value::Array(vec![value.clone()]));
            }
        }
        Value::Object(doc)
    }
}

/// Direction over the `seq` (insertion order) key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Oldest first.
    #[default]
    Ascending,
    /// Newest first.
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    /// `None` = no limit.
    pub limit: Option<u32>,
    pub skip: u32,
}

impl Page {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new(limit: u32, skip: u32) -> Self {
        Self {
            limit: Some(limit),
            skip,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub class: String,
    pub filter: Option<Filter>,
    pub order: SortOrder,
    pub page: Page,
}

impl Query {
    pub fn class(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            filter: None,
            order: SortOrder::Ascending,
            page: Page::all(),
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

// ---------------------------------------------------------------------------
// StoreError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Conditional write lost: the record changed (or vanished) since read.
    VersionMismatch { class: String, id: Uuid },
    /// Insert of an id that already exists.
    Duplicate { class: String, id: Uuid },
    /// The call did not complete within the configured bound.
    Timeout(&'static str),
    /// Transport / connectivity failure. Transient.
    Unavailable(String),
    /// Stored body or row could not be decoded.
    Corrupt(String),
    /// Non-transient backend failure.
    Backend(String),
}

impl StoreError {
    /// Whether a read may be retried after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Timeout(_) | StoreError::Unavailable(_))
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::VersionMismatch { class, id } => {
                write!(f, "conditional write lost on {class}/{id}")
            }
            StoreError::Duplicate { class, id } => write!(f, "{class}/{id} already exists"),
            StoreError::Timeout(op) => write!(f, "store call timed out: {op}"),
            StoreError::Unavailable(msg) => write!(f, "store unavailable: {msg}"),
            StoreError::Corrupt(msg) => write!(f, "corrupt stored record: {msg}"),
            StoreError::Backend(msg) => write!(f, "store backend error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::VersionMismatch { .. } => ServiceError::Conflict(
                "record was modified concurrently; re-read and retry".to_string(),
            ),
            StoreError::Duplicate { .. } => ServiceError::Conflict(e.to_string()),
            StoreError::Timeout(_) | StoreError::Unavailable(_) => {
                ServiceError::Unavailable(e.to_string())
            }
            StoreError::Corrupt(_) | StoreError::Backend(_) => {
                ServiceError::Internal(e.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// EntityStore
// ---------------------------------------------------------------------------

/// The narrow repository interface the core depends on.
///
/// Object-safe so callers hold `Arc<dyn EntityStore>`; `Send + Sync` so it
/// crosses task boundaries.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Human-readable backend name (e.g. `"memory"`, `"postgres"`).
    fn name(&self) -> &'static str;

    async fn get(&self, class: &str, id: Uuid) -> Result<Option<StoredRow>, StoreError>;

    /// Create a record at version 1. Fails with `Duplicate` if the id exists.
    async fn insert(&self, class: &str, id: Uuid, body: Value) -> Result<StoredRow, StoreError>;

    /// Compare-and-swap: replace the body only if the stored version still
    /// equals `expected_version`. Fails with `VersionMismatch` otherwise.
    async fn put_if_version(
        &self,
        class: &str,
        id: Uuid,
        expected_version: i64,
        body: Value,
    ) -> Result<StoredRow, StoreError>;

    async fn query(&self, query: &Query) -> Result<Vec<StoredRow>, StoreError>;

    /// Map an opaque bearer credential to the user it was issued for.
    async fn resolve_session(&self, token: &str) -> Result<Option<String>, StoreError>;
}
