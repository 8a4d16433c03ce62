//! Persistence and identity collaborators.
//!
//! Message and user storage belongs to the HTTP services; this core only
//! needs the narrow slice below.

use crate::error::PersistenceError;
use crate::models::{ChatMessage, MessageId, ReadMark, StoredMessage, UserDisplayInfo, UserId};
use async_trait::async_trait;
use deadpool_postgres::Pool;

#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn user_exists(&self, user_id: UserId) -> Result<bool, PersistenceError>;

    async fn insert_message(&self, message: &ChatMessage)
        -> Result<StoredMessage, PersistenceError>;

    /// Flip read state for messages addressed to `reader_id`.
    ///
    /// Returns one mark per message actually addressed to the reader, carrying
    /// the stored sender. Ids addressed to someone else are left out.
    async fn mark_messages_read(
        &self,
        reader_id: UserId,
        message_ids: &[MessageId],
    ) -> Result<Vec<ReadMark>, PersistenceError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user_display_info(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserDisplayInfo>, PersistenceError>;
}

/// PostgreSQL-backed collaborator over the shared `users` and `messages` tables.
#[derive(Clone)]
pub struct PgChatStore {
    db: Pool,
}

impl PgChatStore {
    pub fn new(db: Pool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn user_exists(&self, user_id: UserId) -> Result<bool, PersistenceError> {
        let client = self.db.get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS(SELECT 1 FROM users WHERE id = $1)",
                &[&user_id],
            )
            .await?;
        Ok(row.get(0))
    }

    async fn insert_message(
        &self,
        message: &ChatMessage,
    ) -> Result<StoredMessage, PersistenceError> {
        let client = self.db.get().await?;
        let row = client
            .query_one(
                r#"
                INSERT INTO messages (
                    sender_id,
                    recipient_id,
                    body,
                    attachment_ref,
                    category,
                    client_sent_at
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, created_at
                "#,
                &[
                    &message.sender_id,
                    &message.recipient_id,
                    &message.body,
                    &message.attachment_ref,
                    &message.category.as_str(),
                    &message.client_sent_at,
                ],
            )
            .await?;

        Ok(StoredMessage {
            id: row.get(0),
            created_at: row.get(1),
        })
    }

    async fn mark_messages_read(
        &self,
        reader_id: UserId,
        message_ids: &[MessageId],
    ) -> Result<Vec<ReadMark>, PersistenceError> {
        let client = self.db.get().await?;
        let rows = client
            .query(
                r#"
                UPDATE messages
                SET is_read = TRUE, read_at = COALESCE(read_at, NOW())
                WHERE recipient_id = $1 AND id = ANY($2)
                RETURNING id, sender_id
                "#,
                &[&reader_id, &message_ids],
            )
            .await?;

        Ok(rows
            .iter()
            .map(|row| ReadMark {
                message_id: row.get(0),
                sender_id: row.get(1),
            })
            .collect())
    }
}

#[async_trait]
impl UserDirectory for PgChatStore {
    async fn get_user_display_info(
        &self,
        user_id: UserId,
    ) -> Result<Option<UserDisplayInfo>, PersistenceError> {
        let client = self.db.get().await?;
        let row = client
            .query_opt(
                "SELECT COALESCE(NULLIF(display_name, ''), username), avatar_url FROM users WHERE id = $1",
                &[&user_id],
            )
            .await?;

        Ok(row.map(|row| UserDisplayInfo {
            name: row.get(0),
            avatar_ref: row.get(1),
        }))
    }
}
