//! Typed access over an [`EntityStore`].

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mkt_schemas::{Conversation, Dispute, Message, Order};
use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::{EntityStore, Filter, Page, Query, SortOrder, StoreError, StoredRow};

/// A record kind that can be persisted.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    /// Store class name.
    const CLASS: &'static str;

    fn id(&self) -> Uuid;
}

impl Record for Order {
    const CLASS: &'static str = "Order";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Dispute {
    const CLASS: &'static str = "Dispute";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Conversation {
    const CLASS: &'static str = "Conversation";

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Message {
    const CLASS: &'static str = "Message";

    fn id(&self) -> Uuid {
        self.id
    }
}

/// A decoded record with its store metadata.
///
/// Serializes as the record's own fields plus `createdAt` / `updatedAt`;
/// `version` and `seq` stay internal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stored<T> {
    #[serde(flatten)]
    pub record: T,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub version: i64,
    #[serde(skip)]
    pub seq: i64,
}

impl<T: Record> Stored<T> {
    fn decode(row: StoredRow) -> Result<Self, StoreError> {
        let record: T = serde_json::from_value(row.body).map_err(|e| {
            StoreError::Corrupt(format!("{}/{}: {e}", row.class, row.id))
        })?;
        Ok(Self {
            record,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
            seq: row.seq,
        })
    }
}

fn encode<T: Record>(record: &T) -> Result<serde_json::Value, StoreError> {
    serde_json::to_value(record)
        .map_err(|e| StoreError::Backend(format!("encode {}: {e}", T::CLASS)))
}

/// Cloneable typed handle shared by the services.
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn EntityStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub async fn get<T: Record>(&self, id: Uuid) -> Result<Option<Stored<T>>, StoreError> {
        self.store
            .get(T::CLASS, id)
            .await?
            .map(Stored::decode)
            .transpose()
    }

    pub async fn insert<T: Record>(&self, record: &T) -> Result<Stored<T>, StoreError> {
        let row = self.store.insert(T::CLASS, record.id(), encode(record)?).await?;
        Stored::decode(row)
    }

    /// Conditional write of `next` over the version observed in `current`.
    pub async fn replace<T: Record>(
        &self,
        current: &Stored<T>,
        next: &T,
    ) -> Result<Stored<T>, StoreError> {
        let row = self
            .store
            .put_if_version(T::CLASS, next.id(), current.version, encode(next)?)
            .await?;
        Stored::decode(row)
    }

    pub async fn find<T: Record>(
        &self,
        filter: Filter,
        order: SortOrder,
        page: Page,
    ) -> Result<Vec<Stored<T>>, StoreError> {
        let q = Query::class(T::CLASS).filter(filter).order(order).page(page);
        self.store
            .query(&q)
            .await?
            .into_iter()
            .map(Stored::decode)
            .collect()
    }

    pub async fn resolve_session(&self, token: &str) -> Result<Option<String>, StoreError> {
        self.store.resolve_session(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use mkt_schemas::{Amount, LineItem, OrderStatus};

    fn order() -> Order {
        Order::new(
            "b",
            "v",
            vec![LineItem {
                product_id: "p".to_string(),
                quantity: 3,
            }],
            Amount::from_major(12.5).unwrap(),
        )
    }

    #[tokio::test]
    async fn typed_round_trip_preserves_record_and_version() {
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        let o = order();
        let stored = repo.insert(&o).await.unwrap();
        assert_eq!(stored.version, 1);

        let got: Stored<Order> = repo.get(o.id).await.unwrap().unwrap();
        assert_eq!(got.record, o);

        let mut next = got.record.clone();
        next.status = OrderStatus::Processing;
        let after = repo.replace(&got, &next).await.unwrap();
        assert_eq!(after.version, 2);
        assert_eq!(after.record.status, OrderStatus::Processing);

        // replaying against the old snapshot loses
        let err = repo.replace(&got, &next).await.unwrap_err();
        assert!(matches!(err, StoreError::VersionMismatch { .. }));
    }

    #[tokio::test]
    async fn undecodable_body_is_reported_as_corrupt() {
        let store = Arc::new(MemoryStore::new());
        let id = Uuid::new_v4();
        store
            .insert(Order::CLASS, id, serde_json::json!({ "objectId": id, "status": 7 }))
            .await
            .unwrap();
        let repo = Repository::new(store);
        let err = repo.get::<Order>(id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test]
    async fn stored_serializes_flat_with_timestamps() {
        let repo = Repository::new(Arc::new(MemoryStore::new()));
        let stored = repo.insert(&order()).await.unwrap();
        let v = serde_json::to_value(&stored).unwrap();
        assert!(v.get("objectId").is_some());
        assert!(v.get("createdAt").is_some());
        assert!(v.get("version").is_none());
    }
}
