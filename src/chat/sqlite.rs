//! SQLite-backed chat store.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::store::{
    Chat, ChatStore, ChatSummary, MessageRole, StoredMessage, DEFAULT_CHAT_TITLE,
};
use crate::errors::RagError;

#[derive(Clone)]
pub struct SqliteChatStore {
    pool: SqlitePool,
}

impl SqliteChatStore {
    pub async fn open(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(RagError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                owner_id TEXT NOT NULL,
                title TEXT NOT NULL CHECK(length(trim(title)) > 0),
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query(
            "\
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chat_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY (chat_id) REFERENCES chats(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chats_owner ON chats(owner_id, updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages(chat_id, id)",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }
}

fn chat_from_row(row: &sqlx::sqlite::SqliteRow) -> Chat {
    Chat {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        title: row.get("title"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage, RagError> {
    let role: String = row.get("role");
    Ok(StoredMessage {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        role: MessageRole::parse(&role)?,
        content: row.get("content"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn create_chat(&self, owner_id: &str) -> Result<Chat, RagError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO chats (id, owner_id, title) VALUES (?1, ?2, ?3)")
            .bind(&id)
            .bind(owner_id)
            .bind(DEFAULT_CHAT_TITLE)
            .execute(&self.pool)
            .await
            .map_err(RagError::internal)?;

        self.get_chat(&id)
            .await?
            .ok_or_else(|| RagError::Internal("chat vanished after insert".to_string()))
    }

    async fn get_chat(&self, id: &str) -> Result<Option<Chat>, RagError> {
        let row = sqlx::query(
            "SELECT id, owner_id, title, created_at, updated_at FROM chats WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(row.as_ref().map(chat_from_row))
    }

    async fn get_chat_owned(&self, id: &str, owner_id: &str) -> Result<Chat, RagError> {
        let chat = self
            .get_chat(id)
            .await?
            .ok_or_else(|| RagError::NotFound(format!("chat {}", id)))?;

        if chat.owner_id != owner_id {
            return Err(RagError::AccessDenied(format!("chat {}", id)));
        }
        Ok(chat)
    }

    async fn list_chats(&self, owner_id: &str) -> Result<Vec<ChatSummary>, RagError> {
        let rows = sqlx::query(
            "\
            SELECT c.id, c.title, c.created_at, c.updated_at,
                   (SELECT COUNT(*) FROM messages WHERE chat_id = c.id) as message_count,
                   (SELECT content FROM messages WHERE chat_id = c.id ORDER BY id DESC LIMIT 1) as last_message
            FROM chats c
            WHERE c.owner_id = ?1
            ORDER BY c.updated_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(rows
            .iter()
            .map(|row| {
                let last_message: Option<String> = row.get("last_message");
                let preview = last_message.unwrap_or_default().chars().take(100).collect();
                ChatSummary {
                    id: row.get("id"),
                    title: row.get("title"),
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                    message_count: row.get("message_count"),
                    preview,
                }
            })
            .collect())
    }

    async fn delete_chat(&self, id: &str, owner_id: &str) -> Result<bool, RagError> {
        let result = sqlx::query("DELETE FROM chats WHERE id = ?1 AND owner_id = ?2")
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(RagError::internal)?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_message(
        &self,
        chat_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<StoredMessage, RagError> {
        let mut tx = self.pool.begin().await.map_err(RagError::internal)?;

        let result = sqlx::query("INSERT INTO messages (chat_id, role, content) VALUES (?1, ?2, ?3)")
            .bind(chat_id)
            .bind(role.as_str())
            .bind(content)
            .execute(&mut *tx)
            .await
            .map_err(RagError::internal)?;
        let message_id = result.last_insert_rowid();

        sqlx::query(
            "UPDATE chats SET updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?1",
        )
        .bind(chat_id)
        .execute(&mut *tx)
        .await
        .map_err(RagError::internal)?;

        tx.commit().await.map_err(RagError::internal)?;

        let row = sqlx::query(
            "SELECT id, chat_id, role, content, created_at FROM messages WHERE id = ?1",
        )
        .bind(message_id)
        .fetch_one(&self.pool)
        .await
        .map_err(RagError::internal)?;

        message_from_row(&row)
    }

    async fn message_count(&self, chat_id: &str) -> Result<i64, RagError> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages WHERE chat_id = ?1")
            .bind(chat_id)
            .fetch_one(&self.pool)
            .await
            .map_err(RagError::internal)
    }

    async fn history_before(
        &self,
        chat_id: &str,
        before_id: i64,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, RagError> {
        let rows = sqlx::query(
            "\
            SELECT id, chat_id, role, content, created_at
            FROM (
                SELECT id, chat_id, role, content, created_at
                FROM messages
                WHERE chat_id = ?1 AND id < ?2
                ORDER BY id DESC
                LIMIT ?3
            )
            ORDER BY id ASC",
        )
        .bind(chat_id)
        .bind(before_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(RagError::internal)?;

        rows.iter().map(message_from_row).collect()
    }

    async fn update_title(&self, chat_id: &str, title: &str) -> Result<bool, RagError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(RagError::Validation("chat title must not be empty".into()));
        }

        let result = sqlx::query(
            "UPDATE chats SET title = ?1, updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
        )
        .bind(title)
        .bind(chat_id)
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(result.rows_affected() > 0)
    }
}
