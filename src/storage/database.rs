//! SQLite Database
//!
//! Embedded chat store using rusqlite with r2d2 connection pooling.
//! Messages and tool calls are upserted by id so a retried create never
//! duplicates a row or disturbs creation order (the original rowid and
//! created_at are kept on conflict).

use std::path::Path;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;

use crate::models::chat::{
    ChatMessage, ChatRecord, ChatRole, MessageStatus, ToolCallRecord, ToolCallStatus,
};
use crate::storage::store::ChatStore;
use crate::utils::error::{AppError, AppResult};

/// Type alias for the connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Database service backing the `ChatStore` trait.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}

impl Database {
    /// Open (or create) a database file at `path`.
    pub fn open(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Create an in-memory database for testing.
    pub fn new_in_memory() -> AppResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| AppError::database(format!("Failed to create connection pool: {}", e)))?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> AppResult<()> {
        let conn = self
            .pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chats (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL,
                role TEXT NOT NULL,
                status TEXT,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_chat_id ON messages(chat_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS tool_calls (
                id TEXT PRIMARY KEY,
                tool_id TEXT NOT NULL,
                arguments TEXT NOT NULL,
                status TEXT NOT NULL,
                result TEXT,
                error TEXT
            )",
            [],
        )?;

        Ok(())
    }

    fn conn(&self) -> AppResult<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| AppError::database(format!("Failed to get connection: {}", e)))
    }

    /// Number of persisted tool calls.
    pub fn tool_call_count(&self) -> AppResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tool_calls", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn role_to_str(role: ChatRole) -> &'static str {
    match role {
        ChatRole::User => "user",
        ChatRole::Assistant => "assistant",
    }
}

fn role_from_str(raw: &str) -> AppResult<ChatRole> {
    match raw {
        "user" => Ok(ChatRole::User),
        "assistant" => Ok(ChatRole::Assistant),
        other => Err(AppError::database(format!("unknown message role: {other}"))),
    }
}

fn status_to_str(status: Option<MessageStatus>) -> Option<&'static str> {
    status.map(|s| match s {
        MessageStatus::Pending => "pending",
        MessageStatus::Complete => "complete",
    })
}

fn status_from_str(raw: Option<String>) -> Option<MessageStatus> {
    match raw.as_deref() {
        Some("pending") => Some(MessageStatus::Pending),
        Some("complete") => Some(MessageStatus::Complete),
        _ => None,
    }
}

#[async_trait]
impl ChatStore for Database {
    async fn create_chat(&self, chat: &ChatRecord) -> AppResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO chats (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![chat.id, chat.name, chat.created_at.to_rfc3339()],
        )?;
        Ok(())
    }

    async fn get_chat(&self, chat_id: &str) -> AppResult<Option<ChatRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT id, name, created_at FROM chats WHERE id = ?1")?;
        let mut rows = stmt.query(params![chat_id])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let created_raw: String = row.get(2)?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&created_raw)
            .map_err(|e| AppError::database(format!("bad chat timestamp: {e}")))?
            .with_timezone(&chrono::Utc);
        Ok(Some(ChatRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            created_at,
        }))
    }

    async fn rename_chat(&self, chat_id: &str, name: &str) -> AppResult<()> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "UPDATE chats SET name = ?2 WHERE id = ?1",
            params![chat_id, name],
        )?;
        if changed == 0 {
            return Err(AppError::not_found(format!("chat {chat_id}")));
        }
        Ok(())
    }

    async fn create_message(&self, message: &ChatMessage) -> AppResult<()> {
        let conn = self.conn()?;
        let content = serde_json::to_string(&message.content)?;
        // Upsert keeps the original rowid and created_at, so retrying a
        // create for the same id cannot disturb ordering.
        conn.execute(
            "INSERT INTO messages (id, chat_id, role, status, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 content = excluded.content",
            params![
                message.id,
                message.chat_id,
                role_to_str(message.role),
                status_to_str(message.status),
                content,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    async fn create_tool_call(&self, tool_call: &ToolCallRecord) -> AppResult<()> {
        let conn = self.conn()?;
        let status = match tool_call.status {
            ToolCallStatus::Pending => "pending",
            ToolCallStatus::Success => "success",
            ToolCallStatus::Error => "error",
        };
        conn.execute(
            "INSERT INTO tool_calls (id, tool_id, arguments, status, result, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 result = excluded.result,
                 error = excluded.error",
            params![
                tool_call.id,
                tool_call.tool_id,
                serde_json::to_string(&tool_call.arguments)?,
                status,
                tool_call.result,
                tool_call.error,
            ],
        )?;
        Ok(())
    }

    async fn list_messages(&self, chat_id: &str) -> AppResult<Vec<ChatMessage>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, chat_id, role, status, content, created_at
             FROM messages WHERE chat_id = ?1
             ORDER BY rowid",
        )?;
        let mut rows = stmt.query(params![chat_id])?;
        let mut messages = Vec::new();
        while let Some(row) = rows.next()? {
            let role_raw: String = row.get(2)?;
            let status_raw: Option<String> = row.get(3)?;
            let content_raw: String = row.get(4)?;
            let created_raw: String = row.get(5)?;
            let created_at = chrono::DateTime::parse_from_rfc3339(&created_raw)
                .map_err(|e| AppError::database(format!("bad message timestamp: {e}")))?
                .with_timezone(&chrono::Utc);
            messages.push(ChatMessage {
                id: row.get(0)?,
                chat_id: row.get(1)?,
                role: role_from_str(&role_raw)?,
                created_at,
                status: status_from_str(status_raw),
                content: serde_json::from_str(&content_raw)?,
            });
        }
        Ok(messages)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::{ContentNode, ToolCallStatus};

    fn db() -> Database {
        Database::new_in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_chat_roundtrip() {
        let db = db();
        let chat = ChatRecord::new("First chat");
        db.create_chat(&chat).await.unwrap();

        let loaded = db.get_chat(&chat.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, chat.id);
        assert_eq!(loaded.name, "First chat");

        assert!(db.get_chat("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rename_chat() {
        let db = db();
        let chat = ChatRecord::new("Old");
        db.create_chat(&chat).await.unwrap();
        db.rename_chat(&chat.id, "New").await.unwrap();
        assert_eq!(db.get_chat(&chat.id).await.unwrap().unwrap().name, "New");

        assert!(db.rename_chat("missing", "x").await.is_err());
    }

    #[tokio::test]
    async fn test_message_roundtrip_preserves_content_nodes() {
        let db = db();
        let mut message = ChatMessage::assistant_pending("chat-1");
        message.content.push(ContentNode::text("hello"));
        message.content.push(ContentNode::ToolCall {
            tool_id: "web:search".to_string(),
            call_id: "call-1".to_string(),
            arguments: serde_json::json!({"q": "x"}),
            status: ToolCallStatus::Success,
            result: Some("found".to_string()),
            error: None,
        });
        message.status = Some(MessageStatus::Complete);
        db.create_message(&message).await.unwrap();

        let loaded = db.list_messages("chat-1").await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].content, message.content);
        assert_eq!(loaded[0].status, Some(MessageStatus::Complete));
        assert_eq!(loaded[0].role, ChatRole::Assistant);
    }

    #[tokio::test]
    async fn test_list_messages_in_creation_order() {
        let db = db();
        for i in 0..5 {
            let message = ChatMessage::user("chat-1", format!("message {i}"));
            db.create_message(&message).await.unwrap();
        }
        let loaded = db.list_messages("chat-1").await.unwrap();
        let texts: Vec<String> = loaded.iter().map(|m| m.plain_text()).collect();
        assert_eq!(texts, vec![
            "message 0",
            "message 1",
            "message 2",
            "message 3",
            "message 4"
        ]);
    }

    #[tokio::test]
    async fn test_duplicate_create_is_idempotent_and_keeps_order() {
        let db = db();
        let first = ChatMessage::user("chat-1", "first");
        let second = ChatMessage::user("chat-1", "second");
        db.create_message(&first).await.unwrap();
        db.create_message(&second).await.unwrap();

        // Retry the first create with updated content.
        let mut retried = first.clone();
        retried.content = vec![ContentNode::text("first (edited)")];
        db.create_message(&retried).await.unwrap();

        let loaded = db.list_messages("chat-1").await.unwrap();
        assert_eq!(loaded.len(), 2, "no duplicate row");
        assert_eq!(loaded[0].plain_text(), "first (edited)");
        assert_eq!(loaded[1].plain_text(), "second");
    }

    #[tokio::test]
    async fn test_messages_scoped_by_chat() {
        let db = db();
        db.create_message(&ChatMessage::user("chat-a", "a"))
            .await
            .unwrap();
        db.create_message(&ChatMessage::user("chat-b", "b"))
            .await
            .unwrap();

        assert_eq!(db.list_messages("chat-a").await.unwrap().len(), 1);
        assert_eq!(db.list_messages("chat-b").await.unwrap().len(), 1);
        assert!(db.list_messages("chat-c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_tool_call_upsert() {
        let db = db();
        let mut call = ToolCallRecord::pending("calc:add", serde_json::json!({"a": 1}));
        call.finalize_success("2");
        db.create_tool_call(&call).await.unwrap();
        db.create_tool_call(&call).await.unwrap();
        assert_eq!(db.tool_call_count().unwrap(), 1);
    }
}
