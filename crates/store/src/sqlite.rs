//! SQLite conversation store.
//!
//! Two tables:
//! - `conversations`: one header row per conversation
//! - `messages`: the immutable transcript, with an `AUTOINCREMENT` sequence
//!   that breaks ties between messages written in the same microsecond

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use dealroom_core::error::StoreError;
use dealroom_core::identity::Principal;
use dealroom_core::message::{Conversation, ConversationId, ConversationScope, Message, Role};
use dealroom_core::store::{ConversationStore, NewConversation, SortOrder};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

/// A SQLite-backed conversation store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let in_memory = path.contains(":memory:");

        if !in_memory {
            let file = path.trim_start_matches("sqlite://").trim_start_matches("sqlite:");
            if let Some(parent) = std::path::Path::new(file).parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
                })?;
            }
        }

        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database lives exactly as long as its one connection
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite conversation store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id              TEXT PRIMARY KEY NOT NULL,
                organization_id TEXT NOT NULL,
                user_id         TEXT NOT NULL,
                scope           TEXT NOT NULL,
                title           TEXT NOT NULL,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                id              TEXT UNIQUE NOT NULL,
                conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
                role            TEXT NOT NULL,
                content         TEXT NOT NULL,
                created_at      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id, created_at, seq)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id, updated_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("conversations index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn row_to_conversation(row: &SqliteRow) -> Result<Conversation, StoreError> {
        let scope_json: String = column(row, "scope")?;
        let scope: ConversationScope = serde_json::from_str(&scope_json)
            .map_err(|e| StoreError::QueryFailed(format!("scope column: {e}")))?;

        Ok(Conversation {
            id: ConversationId(column(row, "id")?),
            organization_id: column(row, "organization_id")?,
            user_id: column(row, "user_id")?,
            scope,
            title: column(row, "title")?,
            created_at: parse_timestamp(&column::<String>(row, "created_at")?)?,
            updated_at: parse_timestamp(&column::<String>(row, "updated_at")?)?,
        })
    }

    fn row_to_message(row: &SqliteRow) -> Result<Message, StoreError> {
        let role: String = column(row, "role")?;
        let role = Role::parse(&role)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown role: {role}")))?;

        Ok(Message {
            id: column(row, "id")?,
            conversation_id: ConversationId(column(row, "conversation_id")?),
            role,
            content: column(row, "content")?,
            created_at: parse_timestamp(&column::<String>(row, "created_at")?)?,
        })
    }
}

fn column<T>(row: &SqliteRow, name: &str) -> Result<T, StoreError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name)
        .map_err(|e| StoreError::QueryFailed(format!("{name} column: {e}")))
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::QueryFailed(format!("bad timestamp {s:?}: {e}")))
}

#[async_trait]
impl ConversationStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create(&self, new: NewConversation) -> Result<Conversation, StoreError> {
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::new(),
            organization_id: new.organization_id,
            user_id: new.user_id,
            scope: new.scope,
            title: new.title,
            created_at: now,
            updated_at: now,
        };
        let scope_json = serde_json::to_string(&conversation.scope)
            .map_err(|e| StoreError::Storage(format!("scope encoding: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO conversations (id, organization_id, user_id, scope, title, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(conversation.id.as_str())
        .bind(&conversation.organization_id)
        .bind(&conversation.user_id)
        .bind(&scope_json)
        .bind(&conversation.title)
        .bind(format_timestamp(now))
        .bind(format_timestamp(now))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("Insert conversation failed: {e}")))?;

        debug!(conversation_id = %conversation.id, "Created conversation");
        Ok(conversation)
    }

    async fn get(&self, id: &ConversationId) -> Result<Option<Conversation>, StoreError> {
        let row = sqlx::query("SELECT * FROM conversations WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Get conversation failed: {e}")))?;

        row.as_ref().map(Self::row_to_conversation).transpose()
    }

    async fn belongs_to(&self, id: &ConversationId, owner: &Principal) -> Result<bool, StoreError> {
        let row = sqlx::query(
            "SELECT 1 FROM conversations WHERE id = ? AND user_id = ? AND organization_id = ?",
        )
        .bind(id.as_str())
        .bind(&owner.user_id)
        .bind(&owner.organization_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Ownership check failed: {e}")))?;
        Ok(row.is_some())
    }

    async fn append(
        &self,
        id: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError> {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            conversation_id: id.clone(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        let created_at = format_timestamp(message.created_at);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("Begin transaction failed: {e}")))?;

        let touched = sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(&created_at)
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("Touch conversation failed: {e}")))?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::ConversationNotFound(id.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(id.as_str())
        .bind(role.as_str())
        .bind(content)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("Insert message failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("Commit failed: {e}")))?;

        Ok(message)
    }

    async fn list_messages(
        &self,
        id: &ConversationId,
        order: SortOrder,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let sql = match order {
            SortOrder::Ascending => {
                "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at ASC, seq ASC LIMIT ?"
            }
            SortOrder::Descending => {
                "SELECT * FROM messages WHERE conversation_id = ? ORDER BY created_at DESC, seq DESC LIMIT ?"
            }
        };

        let rows = sqlx::query(sql)
            .bind(id.as_str())
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("List messages failed: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn list_conversations(
        &self,
        owner: &Principal,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM conversations WHERE user_id = ? AND organization_id = ? \
             ORDER BY updated_at DESC, rowid DESC LIMIT ?",
        )
        .bind(&owner.user_id)
        .bind(&owner.organization_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("List conversations failed: {e}")))?;

        rows.iter().map(Self::row_to_conversation).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn deal_conversation(user: &str) -> NewConversation {
        NewConversation {
            organization_id: "org-1".into(),
            user_id: user.into(),
            title: "Sunrise Manor diligence".into(),
            scope: ConversationScope::Deal {
                deal_id: "deal-7".into(),
            },
        }
    }

    #[tokio::test]
    async fn create_and_get_preserves_scope() {
        let store = test_store().await;
        let conv = store.create(deal_conversation("alice")).await.unwrap();

        let fetched = store.get(&conv.id).await.unwrap().unwrap();
        assert_eq!(fetched.id, conv.id);
        assert_eq!(fetched.title, "Sunrise Manor diligence");
        assert_eq!(fetched.scope.deal_id(), Some("deal-7"));
    }

    #[tokio::test]
    async fn get_missing_is_none() {
        let store = test_store().await;
        assert!(
            store
                .get(&ConversationId::from("missing"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn ownership_check() {
        let store = test_store().await;
        let conv = store.create(deal_conversation("alice")).await.unwrap();
        let alice = Principal::new("alice", "org-1");
        assert!(store.belongs_to(&conv.id, &alice).await.unwrap());
        assert!(!store.belongs_to(&conv.id, &Principal::new("bob", "org-1")).await.unwrap());
        // The same user id configured under another organization owns nothing here
        let elsewhere = Principal::new("alice", "org-2");
        assert!(!store.belongs_to(&conv.id, &elsewhere).await.unwrap());
        assert!(store.list_conversations(&elsewhere, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn messages_keep_insertion_order() {
        let store = test_store().await;
        let conv = store.create(deal_conversation("alice")).await.unwrap();
        for i in 0..5 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            store
                .append(&conv.id, role, &format!("message {i}"))
                .await
                .unwrap();
        }

        let asc = store
            .list_messages(&conv.id, SortOrder::Ascending, 3)
            .await
            .unwrap();
        assert_eq!(
            asc.iter().map(|m| m.content.as_str()).collect::<Vec<_>>(),
            vec!["message 0", "message 1", "message 2"]
        );
        assert_eq!(asc[1].role, Role::Assistant);

        let desc = store
            .list_messages(&conv.id, SortOrder::Descending, 2)
            .await
            .unwrap();
        assert_eq!(desc[0].content, "message 4");
        assert_eq!(desc[1].content, "message 3");
    }

    #[tokio::test]
    async fn append_unknown_conversation() {
        let store = test_store().await;
        let err = store
            .append(&ConversationId::from("ghost"), Role::User, "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConversationNotFound(_)));
    }

    #[tokio::test]
    async fn append_bumps_updated_at() {
        let store = test_store().await;
        let older = store.create(deal_conversation("alice")).await.unwrap();
        let newer = store.create(deal_conversation("alice")).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.append(&older.id, Role::User, "ping").await.unwrap();

        let listed = store
            .list_conversations(&Principal::new("alice", "org-1"), 10)
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, older.id);
        assert_eq!(listed[1].id, newer.id);
        assert!(listed[0].updated_at > listed[0].created_at);
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dealroom.db");
        let path = path.to_string_lossy().into_owned();

        let id = {
            let store = SqliteStore::new(&path).await.unwrap();
            let conv = store.create(deal_conversation("alice")).await.unwrap();
            store.append(&conv.id, Role::User, "kept").await.unwrap();
            store.pool.close().await;
            conv.id
        };

        let store = SqliteStore::new(&path).await.unwrap();
        let messages = store
            .list_messages(&id, SortOrder::Ascending, 10)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "kept");
    }
}
