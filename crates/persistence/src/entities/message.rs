//! Message database entities.

use chrono::{DateTime, Utc};
use domain::models::message::{Audience, Message, MessageKind, Metadata};
use domain::StoreError;
use sqlx::FromRow;
use uuid::Uuid;

/// Database entity for the messages table.
#[derive(Debug, Clone, FromRow)]
pub struct MessageEntity {
    pub id: i64,
    pub message_id: Uuid,
    pub kind: String,
    pub sender_id: Uuid,
    pub recipient_id: Option<Uuid>,
    pub content: String,
    pub priority: String,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<MessageEntity> for Message {
    type Error = StoreError;

    fn try_from(entity: MessageEntity) -> Result<Self, Self::Error> {
        let kind: MessageKind = entity.kind.parse().map_err(StoreError::Corrupt)?;
        let audience =
            Audience::from_parts(kind, entity.recipient_id).map_err(StoreError::Corrupt)?;
        let metadata: Metadata = serde_json::from_value(entity.metadata)
            .map_err(|e| StoreError::Corrupt(format!("message metadata: {}", e)))?;

        Ok(Self {
            id: entity.message_id,
            audience,
            sender_id: entity.sender_id,
            content: entity.content,
            priority: entity.priority.parse().map_err(StoreError::Corrupt)?,
            status: entity.status.parse().map_err(StoreError::Corrupt)?,
            metadata,
            created_at: entity.created_at,
            expires_at: entity.expires_at,
        })
    }
}

/// Database entity for the message_read_receipts table.
#[derive(Debug, Clone, FromRow)]
pub struct ReadReceiptEntity {
    pub id: i64,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::message::MessageStatus;
    use serde_json::json;

    fn entity(kind: &str, recipient_id: Option<Uuid>) -> MessageEntity {
        MessageEntity {
            id: 1,
            message_id: Uuid::new_v4(),
            kind: kind.to_string(),
            sender_id: Uuid::new_v4(),
            recipient_id,
            content: "Practice moved to 6pm".to_string(),
            priority: "high".to_string(),
            status: "sent".to_string(),
            metadata: json!({"source": "coach"}),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    #[test]
    fn test_direct_entity_converts() {
        let recipient = Uuid::new_v4();
        let message = Message::try_from(entity("direct", Some(recipient))).unwrap();
        assert_eq!(message.kind(), MessageKind::Direct);
        assert_eq!(message.recipient_id(), Some(recipient));
        assert_eq!(message.status, MessageStatus::Sent);
        assert_eq!(message.metadata.get("source"), Some(&json!("coach")));
    }

    #[test]
    fn test_inconsistent_entity_is_corrupt() {
        assert!(matches!(
            Message::try_from(entity("direct", None)),
            Err(StoreError::Corrupt(_))
        ));
        assert!(matches!(
            Message::try_from(entity("broadcast", Some(Uuid::new_v4()))),
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let mut e = entity("broadcast", None);
        e.status = "delivered".to_string();
        assert!(Message::try_from(e).is_err());
    }
}
