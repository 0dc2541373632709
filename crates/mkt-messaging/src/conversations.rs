use mkt_schemas::{Conversation, ServiceError, ServiceResult, UserId};
use mkt_store::{Filter, Page, Repository, SortOrder, Stored};
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct NewConversation {
    #[serde(rename = "type")]
    pub kind: String,
    pub participants: Vec<UserId>,
    #[serde(default)]
    pub context: Option<Value>,
}

/// Inbox paging bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

impl PageLimits {
    pub fn page(&self, limit: Option<u32>, skip: u32) -> Page {
        let limit = limit.unwrap_or(self.default_limit).min(self.max_limit);
        Page::new(limit, skip)
    }
}

/// Trim, reject blanks, drop repeats keeping first-seen order.
fn normalize_participants(raw: Vec<UserId>) -> ServiceResult<Vec<UserId>> {
    let mut out: Vec<UserId> = Vec::with_capacity(raw.len());
    for (i, p) in raw.into_iter().enumerate() {
        let p = p.trim();
        if p.is_empty() {
            return Err(ServiceError::InvalidArgument(format!(
                "participants[{i}] is blank"
            )));
        }
        if !out.iter().any(|seen| seen == p) {
            out.push(p.to_string());
        }
    }
    Ok(out)
}

#[derive(Clone)]
pub struct ConversationService {
    repo: Repository,
    limits: PageLimits,
}

impl ConversationService {
    pub fn new(repo: Repository, limits: PageLimits) -> Self {
        Self { repo, limits }
    }

    pub fn limits(&self) -> PageLimits {
        self.limits
    }

    pub async fn create_conversation(
        &self,
        caller: &str,
        req: NewConversation,
    ) -> ServiceResult<Stored<Conversation>> {
        let kind = req.kind.trim();
        if kind.is_empty() {
            return Err(ServiceError::InvalidArgument("type is required".into()));
        }
        let participants = normalize_participants(req.participants)?;
        if participants.len() < 2 {
            return Err(ServiceError::InvalidArgument(
                "a conversation needs at least 2 distinct participants".into(),
            ));
        }
        if !participants.iter().any(|p| p == caller) {
            return Err(ServiceError::InvalidArgument(
                "caller must be one of the participants".into(),
            ));
        }

        let conversation = Conversation {
            id: Uuid::new_v4(),
            kind: kind.to_string(),
            participants,
            context: req.context,
            created_by: caller.to_string(),
        };
        let stored = self.repo.insert(&conversation).await?;
        info!(
            conversation_id = %conversation.id,
            kind,
            members = conversation.participants.len(),
            "conversation created"
        );
        Ok(stored)
    }

    /// Conversations the caller belongs to, newest first.
    pub async fn list_conversations(
        &self,
        caller: &str,
        limit: Option<u32>,
        skip: u32,
    ) -> ServiceResult<Vec<Stored<Conversation>>> {
        let rows = self
            .repo
            .find::<Conversation>(
                Filter::contains("participants", caller),
                SortOrder::Descending,
                self.limits.page(limit, skip),
            )
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mkt_store::MemoryStore;
    use std::sync::Arc;

    fn service() -> ConversationService {
        ConversationService::new(
            Repository::new(Arc::new(MemoryStore::new())),
            PageLimits {
                default_limit: 2,
                max_limit: 3,
            },
        )
    }

    fn req(participants: &[&str]) -> NewConversation {
        NewConversation {
            kind: "pre-sales".to_string(),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            context: None,
        }
    }

    #[test]
    fn participants_are_deduplicated_in_order() {
        let got = normalize_participants(vec![
            "v".into(),
            " b ".into(),
            "v".into(),
            "b".into(),
        ])
        .unwrap();
        assert_eq!(got, vec!["v".to_string(), "b".to_string()]);
        assert!(normalize_participants(vec!["a".into(), "  ".into()]).is_err());
    }

    #[test]
    fn page_limit_is_defaulted_and_clamped() {
        let limits = PageLimits {
            default_limit: 10,
            max_limit: 50,
        };
        assert_eq!(limits.page(None, 0), Page::new(10, 0));
        assert_eq!(limits.page(Some(500), 5), Page::new(50, 5));
    }

    #[tokio::test]
    async fn creation_rules() {
        let svc = service();
        let invalid = |r: ServiceResult<Stored<Conversation>>| {
            matches!(r, Err(ServiceError::InvalidArgument(_)))
        };
        assert!(invalid(svc.create_conversation("b", req(&["b"])).await));
        assert!(invalid(svc.create_conversation("b", req(&["b", "b"])).await));
        assert!(invalid(svc.create_conversation("x", req(&["b", "v"])).await));

        let mut blank_type = req(&["b", "v"]);
        blank_type.kind = " ".to_string();
        assert!(invalid(svc.create_conversation("b", blank_type).await));

        let c = svc.create_conversation("b", req(&["b", "v"])).await.unwrap();
        assert_eq!(c.record.created_by, "b");
        assert_eq!(c.record.kind, "pre-sales");
    }

    #[tokio::test]
    async fn inbox_is_filtered_newest_first_and_paged() {
        let svc = service();
        let c1 = svc.create_conversation("b", req(&["b", "v"])).await.unwrap();
        let _other = svc.create_conversation("x", req(&["x", "v"])).await.unwrap();
        let c3 = svc.create_conversation("v", req(&["v", "b", "z"])).await.unwrap();

        let inbox = svc.list_conversations("b", None, 0).await.unwrap();
        let ids: Vec<Uuid> = inbox.iter().map(|c| c.record.id).collect();
        assert_eq!(ids, vec![c3.record.id, c1.record.id]);

        // default limit 2, clamp 3
        assert_eq!(svc.list_conversations("v", None, 0).await.unwrap().len(), 2);
        assert_eq!(svc.list_conversations("v", Some(99), 0).await.unwrap().len(), 3);
        let tail = svc.list_conversations("v", Some(3), 2).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].record.id, c1.record.id);

        assert!(svc.list_conversations("nobody", None, 0).await.unwrap().is_empty());
    }
}
