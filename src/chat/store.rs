//! Chat model and the ChatStore trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RagError;

/// Placeholder title given to every new chat. Overwritten at most once,
/// after the first successful exchange.
pub const DEFAULT_CHAT_TITLE: &str = "New chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Result<Self, RagError> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(RagError::Internal(format!("unknown message role: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Listing row with message count and a preview of the latest message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
    pub message_count: i64,
    pub preview: String,
}

/// A persisted chat message. Append-only; never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub chat_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: String,
}

#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Create a chat with the placeholder title.
    async fn create_chat(&self, owner_id: &str) -> Result<Chat, RagError>;

    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, RagError>;

    /// Fetch a chat enforcing ownership: NotFound if missing, AccessDenied
    /// if it belongs to someone else.
    async fn get_chat_owned(&self, id: &str, owner_id: &str) -> Result<Chat, RagError>;

    async fn list_chats(&self, owner_id: &str) -> Result<Vec<ChatSummary>, RagError>;

    async fn delete_chat(&self, id: &str, owner_id: &str) -> Result<bool, RagError>;

    /// Append a message and touch the chat's `updated_at` in one
    /// transaction.
    async fn add_message(
        &self,
        chat_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<StoredMessage, RagError>;

    async fn message_count(&self, chat_id: &str) -> Result<i64, RagError>;

    /// The most recent messages strictly older than `before_id`, returned
    /// oldest-first, bounded by `limit`.
    async fn history_before(
        &self,
        chat_id: &str,
        before_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, RagError>;

    /// Overwrite the chat title, stamping `updated_at`. Returns false when
    /// the chat does not exist.
    async fn update_title(&self, chat_id: &str, title: &str) -> Result<bool, RagError>;
}
