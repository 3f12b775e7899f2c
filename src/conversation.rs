//! Conversation audit sink.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::retrieval::SourceRecord;

const TITLE_LIMIT: usize = 80;

/// Errors raised by conversation sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Conversation id does not exist for this owner.
    #[error("Conversation not found.")]
    ConversationNotFound,
    /// Backing store could not be reached.
    #[error("conversation sink unavailable: {0}")]
    Unavailable(String),
}

/// Speaker of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditRole {
    /// The asking user.
    User,
    /// The pipeline's reply.
    Assistant,
}

/// One persisted conversation message.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Conversation the message belongs to.
    pub conversation_id: String,
    /// Owner of the conversation.
    pub owner_id: String,
    /// Speaker.
    pub role: AuditRole,
    /// Message text.
    pub content: String,
    /// Sources shown alongside an answer.
    pub sources: Vec<SourceRecord>,
    /// Free-form request metadata.
    pub meta: Value,
}

/// Persistence boundary for conversations and their messages.
#[async_trait]
pub trait ConversationSink: Send + Sync {
    /// Resolve an existing conversation of `owner_id`, or start a new one when `requested`
    /// is `None`. The first question becomes the title.
    async fn open(
        &self,
        owner_id: &str,
        requested: Option<&str>,
        first_question: &str,
    ) -> Result<String, SinkError>;

    /// Append one message.
    async fn append(&self, record: AuditRecord) -> Result<(), SinkError>;

    /// Drop every conversation.
    async fn clear(&self) -> Result<usize, SinkError>;
}

#[derive(Debug, Clone)]
struct Conversation {
    id: String,
    owner_id: String,
    title: String,
    messages: Vec<AuditRecord>,
}

/// Process-local conversation store.
#[derive(Default)]
pub struct InMemoryConversationSink {
    conversations: RwLock<Vec<Conversation>>,
}

impl InMemoryConversationSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages recorded for a conversation, oldest first.
    pub async fn messages(&self, conversation_id: &str) -> Vec<AuditRecord> {
        self.conversations
            .read()
            .await
            .iter()
            .find(|conversation| conversation.id == conversation_id)
            .map(|conversation| conversation.messages.clone())
            .unwrap_or_default()
    }

    /// Title of a conversation.
    pub async fn title(&self, conversation_id: &str) -> Option<String> {
        self.conversations
            .read()
            .await
            .iter()
            .find(|conversation| conversation.id == conversation_id)
            .map(|conversation| conversation.title.clone())
    }
}

fn title_from(question: &str) -> String {
    let mut title: String = question.chars().take(TITLE_LIMIT).collect();
    if question.chars().count() > TITLE_LIMIT {
        title.push('…');
    }
    if title.is_empty() {
        "Conversation".to_string()
    } else {
        title
    }
}

#[async_trait]
impl ConversationSink for InMemoryConversationSink {
    async fn open(
        &self,
        owner_id: &str,
        requested: Option<&str>,
        first_question: &str,
    ) -> Result<String, SinkError> {
        let mut conversations = self.conversations.write().await;
        if let Some(id) = requested {
            return conversations
                .iter()
                .find(|conversation| conversation.id == id && conversation.owner_id == owner_id)
                .map(|conversation| conversation.id.clone())
                .ok_or(SinkError::ConversationNotFound);
        }

        let id = uuid::Uuid::new_v4().to_string();
        conversations.push(Conversation {
            id: id.clone(),
            owner_id: owner_id.to_string(),
            title: title_from(first_question),
            messages: Vec::new(),
        });
        Ok(id)
    }

    async fn append(&self, record: AuditRecord) -> Result<(), SinkError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .iter_mut()
            .find(|conversation| {
                conversation.id == record.conversation_id
                    && conversation.owner_id == record.owner_id
            })
            .ok_or(SinkError::ConversationNotFound)?;
        conversation.messages.push(record);
        Ok(())
    }

    async fn clear(&self) -> Result<usize, SinkError> {
        let mut conversations = self.conversations.write().await;
        let dropped = conversations.len();
        conversations.clear();
        Ok(dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn open_creates_then_resolves_for_owner_only() {
        let sink = InMemoryConversationSink::new();
        let id = sink.open("u1", None, "What is new?").await.expect("open");

        assert_eq!(sink.open("u1", Some(&id), "ignored").await.expect("reopen"), id);
        assert!(matches!(
            sink.open("u2", Some(&id), "ignored").await,
            Err(SinkError::ConversationNotFound)
        ));
        assert_eq!(sink.title(&id).await.as_deref(), Some("What is new?"));
    }

    #[tokio::test]
    async fn append_keeps_order() {
        let sink = InMemoryConversationSink::new();
        let id = sink.open("u1", None, "q").await.expect("open");
        for (role, content) in [(AuditRole::User, "q"), (AuditRole::Assistant, "a")] {
            sink.append(AuditRecord {
                conversation_id: id.clone(),
                owner_id: "u1".into(),
                role,
                content: content.into(),
                sources: Vec::new(),
                meta: json!({}),
            })
            .await
            .expect("append");
        }
        let roles: Vec<_> = sink.messages(&id).await.into_iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![AuditRole::User, AuditRole::Assistant]);
    }

    #[test]
    fn long_questions_are_truncated_for_titles() {
        let title = title_from(&"x".repeat(100));
        assert_eq!(title.chars().count(), TITLE_LIMIT + 1);
        assert!(title.ends_with('…'));
        assert_eq!(title_from(""), "Conversation");
    }
}
