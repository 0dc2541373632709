//! In-process harness for workflow scenarios.
//!
//! Wires the order and messaging services over one [`MemoryStore`], with
//! small helpers for the steps scenarios repeat. [`DelayedStore`] widens the
//! gap between read and write so racing requests really do interleave.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mkt_messaging::{ConversationService, MessageService, NewConversation, PageLimits};
use mkt_orders::{NewDispute, NewOrder, OrderService, TransitionPolicy};
use mkt_schemas::{Amount, LineItem, Order, OrderStatus, ServiceResult};
use mkt_store::{
    EntityStore, MemoryStore, Query, Repository, StoreError, Stored, StoredRow,
};
use serde_json::Value;
use uuid::Uuid;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub orders: OrderService,
    pub conversations: ConversationService,
    pub messages: MessageService,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_policy(TransitionPolicy::default())
    }

    pub fn with_policy(policy: TransitionPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::over(store.clone(), store, policy)
    }

    /// Services over `backend`; `store` is kept for session seeding.
    pub fn over(
        store: Arc<MemoryStore>,
        backend: Arc<dyn EntityStore>,
        policy: TransitionPolicy,
    ) -> Self {
        let repo = Repository::new(backend);
        Self {
            store,
            orders: OrderService::new(repo.clone(), policy),
            conversations: ConversationService::new(repo.clone(), PageLimits::default()),
            messages: MessageService::new(repo),
        }
    }

    /// Memory store behind a [`DelayedStore`].
    pub fn racy(read_delay: Duration) -> Self {
        let store = Arc::new(MemoryStore::new());
        let delayed = Arc::new(DelayedStore::new(store.clone(), read_delay));
        Self::over(store, delayed, TransitionPolicy::default())
    }

    pub async fn place_order(&self, buyer: &str, vendor: &str) -> Uuid {
        let order = self
            .orders
            .create_order(
                buyer,
                NewOrder {
                    vendor_id: vendor.to_string(),
                    items: vec![LineItem {
                        product_id: "sku-1".to_string(),
                        quantity: 1,
                    }],
                    total: Amount::from_micros(25_000_000).unwrap_or(Amount::ZERO),
                },
            )
            .await;
        match order {
            Ok(o) => o.record.id,
            Err(e) => panic!("place_order failed: {e}"),
        }
    }

    /// Apply `path` in order as `vendor`, panicking on the first refusal.
    pub async fn advance(&self, order_id: Uuid, vendor: &str, path: &[OrderStatus]) {
        for to in path {
            if let Err(e) = self
                .orders
                .request_transition(vendor, order_id, *to, None)
                .await
            {
                panic!("advance to {to} failed: {e}");
            }
        }
    }

    pub async fn dispute(&self, buyer: &str, order_id: Uuid) -> ServiceResult<Uuid> {
        let d = self
            .orders
            .open_dispute(buyer, order_id, dispute_request("not_received"))
            .await?;
        Ok(d.record.id)
    }

    pub async fn order(&self, order_id: Uuid) -> Stored<Order> {
        match self.orders.load_order(order_id).await {
            Ok(o) => o,
            Err(e) => panic!("order {order_id} unreadable: {e}"),
        }
    }

    pub async fn conversation(&self, creator: &str, participants: &[&str]) -> ServiceResult<Uuid> {
        let c = self
            .conversations
            .create_conversation(
                creator,
                NewConversation {
                    kind: "pre-sales".to_string(),
                    participants: participants.iter().map(|p| p.to_string()).collect(),
                    context: None,
                },
            )
            .await?;
        Ok(c.record.id)
    }
}

pub fn dispute_request(reason: &str) -> NewDispute {
    NewDispute {
        reason: reason.to_string(),
        description: String::new(),
        amount_requested: Amount::ZERO,
    }
}

// ---------------------------------------------------------------------------
// DelayedStore
// ---------------------------------------------------------------------------

/// Sleeps after every read so concurrent callers observe the same version.
pub struct DelayedStore {
    inner: Arc<MemoryStore>,
    read_delay: Duration,
}

impl DelayedStore {
    pub fn new(inner: Arc<MemoryStore>, read_delay: Duration) -> Self {
        Self { inner, read_delay }
    }
}

#[async_trait]
impl EntityStore for DelayedStore {
    fn name(&self) -> &'static str {
        "delayed-memory"
    }

    async fn get(&self, class: &str, id: Uuid) -> Result<Option<StoredRow>, StoreError> {
        let row = self.inner.get(class, id).await?;
        tokio::time::sleep(self.read_delay).await;
        Ok(row)
    }

    async fn insert(&self, class: &str, id: Uuid, body: Value) -> Result<StoredRow, StoreError> {
        self.inner.insert(class, id, body).await
    }

    async fn put_if_version(
        &self,
        class: &str,
        id: Uuid,
        expected_version: i64,
        body: Value,
    ) -> Result<StoredRow, StoreError> {
        self.inner
            .put_if_version(class, id, expected_version, body)
            .await
    }

    async fn query(&self, query: &Query) -> Result<Vec<StoredRow>, StoreError> {
        self.inner.query(query).await
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<String>, StoreError> {
        self.inner.resolve_session(token).await
    }
}
