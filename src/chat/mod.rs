//! Chat state and the retrieval-augmented query engine.

mod engine;
mod sqlite;
mod store;

pub use engine::{ChatTurn, RagQueryEngine};
pub use sqlite::SqliteChatStore;
pub use store::{Chat, ChatStore, ChatSummary, MessageRole, StoredMessage, DEFAULT_CHAT_TITLE};
