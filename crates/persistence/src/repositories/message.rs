//! Message repository implementation.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::message::{Message, MessageFilter, MessageStatus, NewMessage};
use domain::ports::MessageStore;
use domain::{StoreError, StoreResult};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::store_error;
use crate::entities::{MessageEntity, ReadReceiptEntity};
use crate::metrics::QueryTimer;

/// Lifecycle rank of a status, used to keep updates monotonic.
fn status_rank(status: MessageStatus) -> i32 {
    match status {
        MessageStatus::Sending => 0,
        MessageStatus::Sent => 1,
        MessageStatus::Read => 2,
    }
}

/// Repository for message database operations.
#[derive(Clone)]
pub struct MessageRepository {
    pool: PgPool,
}

impl MessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    async fn create(&self, message: NewMessage) -> StoreResult<Message> {
        let metadata = serde_json::to_value(&message.metadata)
            .map_err(|e| StoreError::Backend(format!("message metadata: {}", e)))?;

        let timer = QueryTimer::new("create_message");
        let result = sqlx::query_as::<_, MessageEntity>(
            r#"
            INSERT INTO messages (
                kind,
                sender_id,
                recipient_id,
                content,
                priority,
                status,
                metadata,
                expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(message.audience.kind().as_str())
        .bind(message.sender_id)
        .bind(message.audience.recipient_id())
        .bind(&message.content)
        .bind(message.priority.as_str())
        .bind(message.status.as_str())
        .bind(metadata)
        .bind(message.expires_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        result.map_err(store_error)?.try_into()
    }

    async fn find(&self, id: Uuid) -> StoreResult<Option<Message>> {
        let timer = QueryTimer::new("find_message");
        let result = sqlx::query_as::<_, MessageEntity>(
            r#"
            SELECT * FROM messages
            WHERE message_id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result.map_err(store_error)?.map(Message::try_from).transpose()
    }

    async fn list_visible_to(
        &self,
        user_id: Uuid,
        filter: &MessageFilter,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Message>> {
        let timer = QueryTimer::new("list_visible_messages");
        let result = sqlx::query_as::<_, MessageEntity>(
            r#"
            SELECT * FROM messages
            WHERE (kind = 'broadcast' OR sender_id = $1 OR recipient_id = $1)
              AND (expires_at IS NULL OR expires_at > $2)
              AND ($3::text IS NULL OR kind = $3)
              AND ($4::text IS NULL OR status = $4)
              AND ($5::text IS NULL OR priority = $5)
              AND ($6::uuid IS NULL OR sender_id = $6)
              AND ($7::uuid IS NULL OR recipient_id = $7)
            ORDER BY created_at DESC, id DESC
            LIMIT $8
            "#,
        )
        .bind(user_id)
        .bind(now)
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.priority.map(|p| p.as_str()))
        .bind(filter.sender_id)
        .bind(filter.recipient_id)
        .bind(filter.limit.map(|l| l as i64))
        .fetch_all(&self.pool)
        .await;
        timer.record();

        result
            .map_err(store_error)?
            .into_iter()
            .map(Message::try_from)
            .collect()
    }

    async fn upsert_read_receipt(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let timer = QueryTimer::new("upsert_read_receipt");
        let result = sqlx::query(
            r#"
            INSERT INTO message_read_receipts (message_id, user_id, read_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(message_id)
        .bind(user_id)
        .bind(read_at)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(store_error)?.rows_affected() == 1)
    }

    async fn set_status(&self, id: Uuid, status: MessageStatus) -> StoreResult<Option<Message>> {
        let timer = QueryTimer::new("set_message_status");
        let result = sqlx::query_as::<_, MessageEntity>(
            r#"
            UPDATE messages
            SET status = CASE
                WHEN (CASE status WHEN 'sending' THEN 0 WHEN 'sent' THEN 1 ELSE 2 END) < $3
                THEN $2
                ELSE status
            END
            WHERE message_id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(status_rank(status))
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result.map_err(store_error)?.map(Message::try_from).transpose()
    }

    async fn read_message_ids(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        let timer = QueryTimer::new("list_read_receipts");
        let result = sqlx::query_as::<_, ReadReceiptEntity>(
            r#"
            SELECT * FROM message_read_receipts
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await;
        timer.record();

        Ok(result
            .map_err(store_error)?
            .into_iter()
            .map(|r| r.message_id)
            .collect())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let timer = QueryTimer::new("delete_message");
        let result = sqlx::query(
            r#"
            DELETE FROM messages
            WHERE message_id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await;
        timer.record();

        Ok(result.map_err(store_error)?.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_rank_follows_lifecycle() {
        assert!(status_rank(MessageStatus::Sending) < status_rank(MessageStatus::Sent));
        assert!(status_rank(MessageStatus::Sent) < status_rank(MessageStatus::Read));
    }
}
