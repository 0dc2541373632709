//! Shared runtime state for mkt-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The services are cheap
//! `Clone` handles over one shared [`Repository`].

use std::sync::Arc;

use anyhow::{bail, Context};
use mkt_config::{ResolvedSecrets, ServiceConfig, StoreBackend};
use mkt_messaging::{ConversationService, MessageService, PageLimits};
use mkt_orders::{OrderService, TransitionPolicy};
use mkt_schemas::{Conversation, Dispute, Message, Order, OrderStatus};
use mkt_store::{EntityStore, MemoryStore, PgStore, Repository, ResilientStore, RetryPolicy};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::info;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// BusMsg: SSE event bus payload
// ---------------------------------------------------------------------------

/// Events broadcast on the internal bus and surfaced as SSE.
///
/// Each carries the ids that decide who may see it; see [`BusMsg::visible_to`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BusMsg {
    OrderStatus {
        order_id: Uuid,
        status: OrderStatus,
        by: String,
        buyer_id: String,
        vendor_id: String,
    },
    DisputeOpened {
        dispute_id: Uuid,
        order_id: Uuid,
        buyer_id: String,
        vendor_id: String,
    },
    Message {
        conversation_id: Uuid,
        message_id: Uuid,
        sender_id: String,
        text: String,
        participants: Vec<String>,
    },
}

impl BusMsg {
    pub fn order_status(order: &Order, by: &str) -> Self {
        BusMsg::OrderStatus {
            order_id: order.id,
            status: order.status,
            by: by.to_string(),
            buyer_id: order.buyer_id.clone(),
            vendor_id: order.vendor_id.clone(),
        }
    }

    pub fn dispute_opened(dispute: &Dispute, order: &Order) -> Self {
        BusMsg::DisputeOpened {
            dispute_id: dispute.id,
            order_id: order.id,
            buyer_id: order.buyer_id.clone(),
            vendor_id: order.vendor_id.clone(),
        }
    }

    pub fn message(message: &Message, conversation: &Conversation) -> Self {
        BusMsg::Message {
            conversation_id: conversation.id,
            message_id: message.id,
            sender_id: message.sender_id.clone(),
            text: message.text.clone(),
            participants: conversation.participants.clone(),
        }
    }

    pub fn event_name(&self) -> &'static str {
        match self {
            BusMsg::OrderStatus { .. } => "order_status",
            BusMsg::DisputeOpened { .. } => "dispute_opened",
            BusMsg::Message { .. } => "message",
        }
    }

    /// Order events go to the order's parties, message events to the
    /// conversation's participants.
    pub fn visible_to(&self, user: &str) -> bool {
        match self {
            BusMsg::OrderStatus {
                buyer_id,
                vendor_id,
                ..
            }
            | BusMsg::DisputeOpened {
                buyer_id,
                vendor_id,
                ..
            } => buyer_id == user || vendor_id == user,
            BusMsg::Message { participants, .. } => participants.iter().any(|p| p == user),
        }
    }
}

// ---------------------------------------------------------------------------
// BuildInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    /// Broadcast bus for SSE.
    pub bus: broadcast::Sender<BusMsg>,
    pub build: BuildInfo,
    /// Backend name reported by /health.
    pub store_name: &'static str,
    /// Raw typed store access (session lookup).
    pub repo: Repository,
    pub orders: OrderService,
    pub conversations: ConversationService,
    pub messages: MessageService,
}

impl AppState {
    pub fn new(store: Arc<dyn EntityStore>, cfg: &ServiceConfig) -> Self {
        let (bus, _rx) = broadcast::channel::<BusMsg>(1024);
        let store_name = store.name();
        let repo = Repository::new(store);

        Self {
            bus,
            build: BuildInfo {
                service: "mkt-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            store_name,
            orders: OrderService::new(
                repo.clone(),
                TransitionPolicy {
                    buyer_may_cancel: cfg.workflow.buyer_may_cancel,
                },
            ),
            conversations: ConversationService::new(
                repo.clone(),
                PageLimits {
                    default_limit: cfg.messaging.default_page_limit,
                    max_limit: cfg.messaging.max_page_limit,
                },
            ),
            messages: MessageService::new(repo.clone()),
            repo,
        }
    }

    /// Fire-and-forget publish; no subscribers is fine.
    pub fn publish(&self, msg: BusMsg) {
        let _ = self.bus.send(msg);
    }
}

// ---------------------------------------------------------------------------
// Store selection
// ---------------------------------------------------------------------------

/// Build the configured backend wrapped in the timeout/retry layer.
///
/// Postgres must already be migrated (`mkt db migrate`); the daemon refuses
/// to start against an empty schema.
pub async fn build_store(
    cfg: &ServiceConfig,
    secrets: &ResolvedSecrets,
) -> anyhow::Result<Arc<dyn EntityStore>> {
    let inner: Arc<dyn EntityStore> = match cfg.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Postgres => {
            let url = secrets
                .database_url
                .as_deref()
                .context("postgres backend selected but no database url resolved")?;
            let pool = mkt_store::connect(url, cfg.store.max_connections).await?;
            let st = mkt_store::status(&pool).await?;
            if !st.has_entities_table {
                bail!("database is not migrated: run `mkt db migrate` first");
            }
            Arc::new(PgStore::new(pool))
        }
    };
    info!(backend = inner.name(), "store ready");
    Ok(Arc::new(ResilientStore::new(inner, RetryPolicy::from(&cfg.store))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_events_reach_only_the_parties() {
        let msg = BusMsg::OrderStatus {
            order_id: Uuid::nil(),
            status: OrderStatus::Shipped,
            by: "v".into(),
            buyer_id: "b".into(),
            vendor_id: "v".into(),
        };
        assert!(msg.visible_to("b"));
        assert!(msg.visible_to("v"));
        assert!(!msg.visible_to("x"));
        assert_eq!(msg.event_name(), "order_status");
    }

    #[test]
    fn message_events_reach_only_participants() {
        let msg = BusMsg::Message {
            conversation_id: Uuid::nil(),
            message_id: Uuid::nil(),
            sender_id: "b".into(),
            text: "hi".into(),
            participants: vec!["b".into(), "v".into()],
        };
        assert!(msg.visible_to("v"));
        assert!(!msg.visible_to("x"));
    }
}
