use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Amount, UserId};

// ---------------------------------------------------------------------------
// OrderStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    Processing,
    Shipped,
    /// **Terminal.**
    Delivered,
    /// **Terminal.**
    Cancelled,
}

impl OrderStatus {
    /// Returns `true` if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "new",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Some(OrderStatus::New),
            "processing" => Some(OrderStatus::Processing),
            "shipped" => Some(OrderStatus::Shipped),
            "delivered" => Some(OrderStatus::Delivered),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub quantity: u32,
}

/// One accepted status transition. The history of an order replays from
/// `new` to its current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub by: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub at: DateTime<Utc>,
}

/// A buyer–vendor transaction.
///
/// `buyer_id`, `vendor_id`, `items` and `total` never change after creation.
/// `status` changes only through the order status machine, and
/// `open_dispute_id` is set only while a dispute blocks transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(rename = "objectId")]
    pub id: Uuid,
    pub buyer_id: UserId,
    pub vendor_id: UserId,
    pub items: Vec<LineItem>,
    pub total: Amount,
    pub status: OrderStatus,
    #[serde(default)]
    pub open_dispute_id: Option<Uuid>,
    #[serde(default)]
    pub status_history: Vec<StatusChange>,
}

impl Order {
    pub fn new(
        buyer_id: impl Into<UserId>,
        vendor_id: impl Into<UserId>,
        items: Vec<LineItem>,
        total: Amount,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            buyer_id: buyer_id.into(),
            vendor_id: vendor_id.into(),
            items,
            total,
            status: OrderStatus::New,
            open_dispute_id: None,
            status_history: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_as_snake_case() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(OrderStatus::parse(" Shipped "), Some(OrderStatus::Shipped));
        assert_eq!(OrderStatus::parse("lost"), None);
    }

    #[test]
    fn only_delivered_and_cancelled_are_terminal() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Shipped.is_terminal());
    }

    #[test]
    fn order_body_uses_object_id_and_camel_case() {
        let o = Order::new(
            "buyer",
            "vendor",
            vec![LineItem {
                product_id: "p1".to_string(),
                quantity: 2,
            }],
            Amount::from_major(10.0).unwrap(),
        );
        let v = serde_json::to_value(&o).unwrap();
        assert_eq!(v["objectId"], o.id.to_string());
        assert_eq!(v["buyerId"], "buyer");
        assert_eq!(v["items"][0]["productId"], "p1");
        assert_eq!(v["status"], "new");
        assert!(v["openDisputeId"].is_null());
    }
}
