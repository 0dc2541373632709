use mkt_access::ensure_participant;
use mkt_schemas::{Conversation, Message, ServiceError, ServiceResult};
use mkt_store::{Filter, Page, Repository, SortOrder, Stored};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone)]
pub struct MessageService {
    repo: Repository,
}

impl MessageService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    async fn member_conversation(
        &self,
        caller: &str,
        conversation_id: Uuid,
    ) -> ServiceResult<Stored<Conversation>> {
        let conversation = self
            .repo
            .get::<Conversation>(conversation_id)
            .await?
            .ok_or_else(|| {
                ServiceError::not_found(format_args!("conversation {conversation_id}"))
            })?;
        ensure_participant(caller, &conversation.record)?;
        Ok(conversation)
    }

    /// The conversation is returned alongside the message so callers can
    /// address its participants without a second read.
    pub async fn send_message(
        &self,
        caller: &str,
        conversation_id: Uuid,
        text: &str,
    ) -> ServiceResult<(Stored<Message>, Stored<Conversation>)> {
        let conversation = self.member_conversation(caller, conversation_id).await?;
        if text.trim().is_empty() {
            return Err(ServiceError::InvalidArgument("text is required".into()));
        }

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id: caller.to_string(),
            text: text.to_string(),
        };
        let stored = self.repo.insert(&message).await?;
        debug!(%conversation_id, message_id = %message.id, sender = caller, "message appended");
        Ok((stored, conversation))
    }

    /// Every message in the conversation, oldest first.
    pub async fn list_messages(
        &self,
        caller: &str,
        conversation_id: Uuid,
    ) -> ServiceResult<Vec<Stored<Message>>> {
        self.member_conversation(caller, conversation_id).await?;
        let rows = self
            .repo
            .find::<Message>(
                Filter::eq("conversationId", conversation_id.to_string()),
                SortOrder::Ascending,
                Page::all(),
            )
            .await?;
        Ok(rows)
    }
}
