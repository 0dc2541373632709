//! Request and response types for the mkt-daemon HTTP endpoints.
//!
//! Order and conversation creation bodies reuse `mkt_orders::NewOrder` and
//! `mkt_messaging::NewConversation` directly.

use mkt_schemas::Amount;
use mkt_orders::NewDispute;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub error: String,
}

// ---------------------------------------------------------------------------
// Orders / disputes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenDisputeRequest {
    pub order_id: String,
    pub reason: String,
    #[serde(default)]
    pub description: String,
    pub amount_requested: Amount,
}

impl OpenDisputeRequest {
    pub fn into_parts(self) -> (String, NewDispute) {
        (
            self.order_id,
            NewDispute {
                reason: self.reason,
                description: self.description,
                amount_requested: self.amount_requested,
            },
        )
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub conversation_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub limit: Option<u32>,
    #[serde(default)]
    pub skip: u32,
}

/// `{ "results": [...] }` listing envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ListResponse<T> {
    pub results: Vec<T>,
}
