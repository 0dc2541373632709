use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::UserId;

/// A fixed-membership channel. `participants` is set at creation and never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(rename = "objectId")]
    pub id: Uuid,
    /// Caller-supplied category (e.g. "pre_sales"); not interpreted.
    #[serde(rename = "type")]
    pub kind: String,
    pub participants: Vec<UserId>,
    /// Opaque caller metadata (e.g. the related product).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    pub created_by: UserId,
}

impl Conversation {
    pub fn has_participant(&self, user: &str) -> bool {
        self.participants.iter().any(|p| p == user)
    }
}

/// One message in a conversation. Ordering comes from the store-assigned
/// `createdAt` and sequence, not from anything in this body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(rename = "objectId")]
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: UserId,
    pub text: String,
}
