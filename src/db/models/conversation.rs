//! Conversation threads owned by a single user.
//!
//! Every lookup is scoped by `user_id`; a conversation that belongs to
//! someone else is reported exactly like one that does not exist.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Status given to every newly created conversation
pub const STATUS_ACTIVE: &str = "active";

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationThread {
    pub id: i64,
    #[serde(skip_serializing)]
    pub user_id: i64,
    pub thread_id: String,
    pub assistant_id: Option<String>,
    pub created_at: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateConversationResponse {
    pub conversation_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SendMessageResponse {
    pub conversation_id: i64,
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationMessagesResponse {
    pub conversation_id: i64,
    pub messages: Vec<crate::assistant::ThreadMessage>,
}

impl ConversationThread {
    pub async fn create(
        db: &SqlitePool,
        user_id: i64,
        thread_id: &str,
        assistant_id: &str,
    ) -> Result<ConversationThread, sqlx::Error> {
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query_as::<_, ConversationThread>(
            r#"
            INSERT INTO conversation_threads (user_id, thread_id, assistant_id, created_at, status)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, user_id, thread_id, assistant_id, created_at, status
            "#,
        )
        .bind(user_id)
        .bind(thread_id)
        .bind(assistant_id)
        .bind(&now)
        .bind(STATUS_ACTIVE)
        .fetch_one(db)
        .await
    }

    /// All conversations owned by `user_id`, oldest first
    pub async fn list_for_user(
        db: &SqlitePool,
        user_id: i64,
    ) -> Result<Vec<ConversationThread>, sqlx::Error> {
        sqlx::query_as::<_, ConversationThread>(
            r#"
            SELECT id, user_id, thread_id, assistant_id, created_at, status
            FROM conversation_threads
            WHERE user_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }

    /// Fetch a conversation only if `user_id` owns it
    pub async fn get_for_user(
        db: &SqlitePool,
        user_id: i64,
        id: i64,
    ) -> Result<Option<ConversationThread>, sqlx::Error> {
        sqlx::query_as::<_, ConversationThread>(
            r#"
            SELECT id, user_id, thread_id, assistant_id, created_at, status
            FROM conversation_threads
            WHERE id = ? AND user_id = ?
            "#,
        )
        .bind(id)
        .bind(user_id)
        .fetch_optional(db)
        .await
    }
}
