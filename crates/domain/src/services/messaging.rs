//! Messaging service.
//!
//! Validates and persists broadcast and direct messages, then publishes a
//! push event. Persistence is the source of truth; publishing never fails a
//! request.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use shared::validation::validate_expiry;

use crate::error::{DomainError, DomainResult};
use crate::models::event::{MessageReadPayload, PushEvent};
use crate::models::message::{
    Audience, GroupedMessages, Message, MessageFilter, MessageStatus, NewMessage,
    SendBroadcastRequest, SendDirectMessageRequest, SentMessageResponse, UnreadCount,
};
use crate::ports::MessageStore;
use crate::services::notification::{Dispatch, Notifier, PublishResult};

fn validation_error(err: ValidationError) -> DomainError {
    DomainError::Validation(
        err.message
            .map(|m| m.to_string())
            .unwrap_or_else(|| err.code.to_string()),
    )
}

#[derive(Clone)]
pub struct MessagingService {
    store: Arc<dyn MessageStore>,
    notifier: Arc<dyn Notifier>,
}

impl MessagingService {
    pub fn new(store: Arc<dyn MessageStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    /// Sends a message to every connected session.
    ///
    /// The returned recipient count is the number of sessions connected at
    /// publish time, not a delivery count.
    pub async fn send_broadcast(
        &self,
        sender_id: Uuid,
        request: SendBroadcastRequest,
    ) -> DomainResult<SentMessageResponse> {
        request.validate()?;
        if let Some(expires_at) = request.expires_at {
            validate_expiry(expires_at, Utc::now()).map_err(validation_error)?;
        }

        let message = self
            .store
            .create(NewMessage {
                audience: Audience::Broadcast,
                sender_id,
                content: request.content,
                priority: request.priority,
                status: MessageStatus::Sent,
                metadata: request.metadata,
                expires_at: request.expires_at,
            })
            .await?;

        let recipient_count = self.notifier.online_count();
        self.publish(Dispatch::to_all(PushEvent::NewMessage(message.clone())));

        tracing::info!(
            message_id = %message.id,
            sender_id = %sender_id,
            priority = %message.priority,
            recipient_count = recipient_count,
            "Broadcast sent"
        );

        Ok(SentMessageResponse {
            message,
            recipient_count: Some(recipient_count),
        })
    }

    /// Sends a message to a single recipient.
    pub async fn send_direct(
        &self,
        sender_id: Uuid,
        request: SendDirectMessageRequest,
    ) -> DomainResult<Message> {
        request.validate()?;
        let recipient_id = request
            .recipient_id
            .ok_or_else(|| DomainError::Validation("recipientId is required".to_string()))?;
        if let Some(expires_at) = request.expires_at {
            validate_expiry(expires_at, Utc::now()).map_err(validation_error)?;
        }

        let message = self
            .store
            .create(NewMessage {
                audience: Audience::Direct { recipient_id },
                sender_id,
                content: request.content,
                priority: request.priority,
                status: MessageStatus::Sent,
                metadata: request.metadata,
                expires_at: request.expires_at,
            })
            .await?;

        self.publish(Dispatch::to_user(
            recipient_id,
            PushEvent::NewMessage(message.clone()),
        ));

        tracing::info!(
            message_id = %message.id,
            sender_id = %sender_id,
            recipient_id = %recipient_id,
            "Direct message sent"
        );

        Ok(message)
    }

    /// Marks a message read on behalf of `user_id`.
    ///
    /// A direct message only changes when its recipient reads it; anyone
    /// else gets the message back untouched. A broadcast records a receipt
    /// for the reader and keeps its status.
    pub async fn mark_read(&self, message_id: Uuid, user_id: Uuid) -> DomainResult<Message> {
        let message = self
            .store
            .find(message_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Message not found".to_string()))?;

        let now = Utc::now();
        let (updated, first_read) = match message.audience {
            Audience::Direct { recipient_id } if recipient_id != user_id => {
                tracing::debug!(
                    message_id = %message_id,
                    user_id = %user_id,
                    "Ignoring read mark from non-recipient"
                );
                return Ok(message);
            }
            Audience::Direct { .. } if message.status == MessageStatus::Read => {
                return Ok(message);
            }
            Audience::Direct { .. } => {
                let inserted = self
                    .store
                    .upsert_read_receipt(message_id, user_id, now)
                    .await?;
                let updated = self
                    .store
                    .set_status(message_id, MessageStatus::Read)
                    .await?
                    .ok_or_else(|| DomainError::NotFound("Message not found".to_string()))?;
                (updated, inserted)
            }
            Audience::Broadcast if message.sender_id == user_id => return Ok(message),
            Audience::Broadcast => {
                let inserted = self
                    .store
                    .upsert_read_receipt(message_id, user_id, now)
                    .await?;
                (message, inserted)
            }
        };

        // Only the call that stored the receipt notifies, so repeated or
        // concurrent reads produce one event carrying the stored time.
        if first_read && updated.sender_id != user_id {
            self.publish(Dispatch::to_user(
                updated.sender_id,
                PushEvent::MessageRead(MessageReadPayload {
                    message_id,
                    read_by: user_id,
                    read_at: now,
                }),
            ));
        }

        Ok(updated)
    }

    /// Deletes a message. Only its sender may do so; no event is pushed.
    pub async fn delete(&self, message_id: Uuid, user_id: Uuid) -> DomainResult<()> {
        let message = self
            .store
            .find(message_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Message not found".to_string()))?;

        if message.sender_id != user_id {
            return Err(DomainError::Forbidden(
                "Only the sender can delete this message".to_string(),
            ));
        }

        if !self.store.delete(message_id).await? {
            return Err(DomainError::NotFound("Message not found".to_string()));
        }

        tracing::info!(message_id = %message_id, user_id = %user_id, "Message deleted");
        Ok(())
    }

    /// Messages visible to `user_id`, newest first.
    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: &MessageFilter,
    ) -> DomainResult<Vec<Message>> {
        Ok(self
            .store
            .list_visible_to(user_id, filter, Utc::now())
            .await?)
    }

    /// Visible messages split into broadcasts, direct messages and alert
    /// notices.
    pub async fn load_for_user(
        &self,
        user_id: Uuid,
        filter: &MessageFilter,
    ) -> DomainResult<GroupedMessages> {
        let messages = self.list_for_user(user_id, filter).await?;
        Ok(GroupedMessages::from_messages(messages))
    }

    pub async fn unread_count(&self, user_id: Uuid) -> DomainResult<UnreadCount> {
        let messages = self.list_for_user(user_id, &MessageFilter::default()).await?;
        let read_ids = self.store.read_message_ids(user_id).await?;

        let unread_count = messages
            .iter()
            .filter(|m| m.is_unread_for(user_id, &read_ids))
            .count();

        Ok(UnreadCount {
            unread_count,
            total_messages: messages.len(),
        })
    }

    fn publish(&self, dispatch: Dispatch) {
        let event_type = dispatch.event.event_type();
        if let PublishResult::Dropped(reason) = self.notifier.publish(dispatch) {
            tracing::warn!(event_type = event_type, reason = %reason, "Push event dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_prefers_message() {
        let mut err = ValidationError::new("expiry_past");
        err.message = Some("Expiry must be in the future".into());
        assert_eq!(
            validation_error(err).to_string(),
            "Expiry must be in the future"
        );

        let bare = ValidationError::new("expiry_past");
        assert_eq!(validation_error(bare).to_string(), "expiry_past");
    }
}
