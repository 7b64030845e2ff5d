//! Retrieval-augmented query engine: one chat turn end to end.
//!
//! Retrieval is best-effort: a failed search downgrades to an empty
//! context with a warning. Generation is not: a failed completion surfaces
//! to the caller and nothing is persisted for the assistant side. Once the
//! assistant message is written the turn is complete; title generation and
//! anything after it can only log, never fail the turn.

use std::sync::Arc;

use serde::Serialize;

use super::store::{ChatStore, MessageRole, StoredMessage, DEFAULT_CHAT_TITLE};
use crate::config::AppConfig;
use crate::errors::RagError;
use crate::llm::{ChatMessage, CompletionRequest, ModelProvider};
use crate::vector::{PayloadFilter, VectorMatch, VectorStore};

const CONTEXT_SYSTEM_PROMPT: &str = "\
You are a helpful assistant with access to the user's documents. Use the \
context below to answer when it is relevant. If the context does not contain \
enough information to answer, say so, and fall back to your general knowledge \
where appropriate.\n\nContext:\n";

const GENERIC_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer the user's questions clearly and concisely.";

const TITLE_SYSTEM_PROMPT: &str = "\
Generate a short title (at most six words) for a conversation that starts \
with the following user message. Reply with the title only, no quotes.";

const CONTEXT_DELIMITER: &str = "\n\n---\n\n";

/// Result of one successful chat turn.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub user_message: StoredMessage,
    pub assistant_message: StoredMessage,
}

pub struct RagQueryEngine {
    config: AppConfig,
    chats: Arc<dyn ChatStore>,
    vectors: Arc<dyn VectorStore>,
    provider: Arc<dyn ModelProvider>,
}

impl RagQueryEngine {
    pub fn new(
        config: AppConfig,
        chats: Arc<dyn ChatStore>,
        vectors: Arc<dyn VectorStore>,
        provider: Arc<dyn ModelProvider>,
    ) -> Result<Self, RagError> {
        config.validate()?;
        Ok(Self {
            config,
            chats,
            vectors,
            provider,
        })
    }

    /// Run one chat turn for `(chat_id, owner_id, text)` and return both
    /// persisted messages.
    pub async fn send_message(
        &self,
        chat_id: &str,
        owner_id: &str,
        text: &str,
    ) -> Result<ChatTurn, RagError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RagError::Validation("message must not be empty".into()));
        }

        let chat = self.chats.get_chat_owned(chat_id, owner_id).await?;
        let first_exchange = self.chats.message_count(chat_id).await? == 0;

        let user_message = self
            .chats
            .add_message(chat_id, MessageRole::User, text)
            .await?;

        let hits = match self.retrieve(owner_id, text).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(
                    chat_id = %chat_id,
                    error = %e,
                    "retrieval failed, continuing with empty context"
                );
                Vec::new()
            }
        };

        let system_prompt = build_system_prompt(&hits);
        let history = self
            .chats
            .history_before(chat_id, user_message.id, self.config.history_window)
            .await?;

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        for m in &history {
            messages.push(ChatMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            });
        }
        messages.push(ChatMessage::user(text));

        let request = CompletionRequest::new(messages).with_options(
            self.config.provider.temperature,
            self.config.provider.top_p,
            self.config.provider.max_tokens,
        );

        let reply = self
            .provider
            .complete(request)
            .await
            .map_err(|e| RagError::Generation(e.to_string()))?;

        let assistant_message = self
            .chats
            .add_message(chat_id, MessageRole::Assistant, &reply)
            .await?;

        // The turn is complete from here on; the title step may only log.
        if first_exchange && chat.title == DEFAULT_CHAT_TITLE {
            self.set_title(chat_id, text).await;
        }

        Ok(ChatTurn {
            user_message,
            assistant_message,
        })
    }

    async fn retrieve(&self, owner_id: &str, text: &str) -> Result<Vec<VectorMatch>, RagError> {
        let embedding = self.provider.embed(text).await?;
        let filter = PayloadFilter::Owner(owner_id.to_string());
        self.vectors
            .search(&embedding, self.config.retrieval_top_k, Some(&filter))
            .await
    }

    /// Title the chat after its first exchange. Any failure falls back to a
    /// truncated copy of the user's message; nothing here fails the turn.
    async fn set_title(&self, chat_id: &str, first_message: &str) {
        let max_len = self.config.title_max_len;

        let generated = self.generate_title(first_message).await;
        let title = generated
            .and_then(|t| sanitize_title(&t, max_len))
            .or_else(|| sanitize_title(first_message, max_len))
            .unwrap_or_else(|| DEFAULT_CHAT_TITLE.to_string());

        if let Err(e) = self.chats.update_title(chat_id, &title).await {
            tracing::warn!(chat_id = %chat_id, error = %e, "failed to store chat title");
        }
    }

    async fn generate_title(&self, first_message: &str) -> Option<String> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(TITLE_SYSTEM_PROMPT),
            ChatMessage::user(first_message),
        ])
        .with_options(0.2, self.config.provider.top_p, 32);

        match self.provider.complete(request).await {
            Ok(title) => Some(title),
            Err(e) => {
                tracing::warn!(error = %e, "title generation failed, using fallback");
                None
            }
        }
    }
}

/// Render retrieved chunks as a labeled context block, descending-score
/// order, sections joined by a delimiter.
fn format_context(hits: &[VectorMatch]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "[Document {}: {}]\n{}",
                i + 1,
                hit.payload.metadata.filename,
                hit.payload.content
            )
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_DELIMITER)
}

fn build_system_prompt(hits: &[VectorMatch]) -> String {
    if hits.is_empty() {
        GENERIC_SYSTEM_PROMPT.to_string()
    } else {
        format!("{}{}", CONTEXT_SYSTEM_PROMPT, format_context(hits))
    }
}

/// First line, trimmed of whitespace and wrapping quotes, clamped to
/// `max_len` characters. None when nothing printable remains.
fn sanitize_title(raw: &str, max_len: usize) -> Option<String> {
    let line = raw.lines().next().unwrap_or_default();
    let trimmed = line.trim().trim_matches(|c| c == '"' || c == '\'').trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(max_len).collect())
}
