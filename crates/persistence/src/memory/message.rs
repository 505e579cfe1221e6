//! In-memory implementation of the `MessageStore` port.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::message::{Message, MessageFilter, MessageStatus, NewMessage, ReadReceipt};
use domain::ports::MessageStore;
use domain::StoreResult;
use uuid::Uuid;

use super::poisoned;

#[derive(Debug, Default)]
struct State {
    /// Messages with their insertion sequence, used as an ordering tiebreak.
    messages: HashMap<Uuid, (u64, Message)>,
    receipts: HashMap<(Uuid, Uuid), ReadReceipt>,
    next_seq: u64,
}

/// Thread-safe message store backed by a map.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMessageStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages. Returns `0` if the lock is poisoned.
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.messages.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receipt recorded for (message, user), if any.
    pub fn receipt(&self, message_id: Uuid, user_id: Uuid) -> Option<ReadReceipt> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.receipts.get(&(message_id, user_id)).cloned())
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create(&self, message: NewMessage) -> StoreResult<Message> {
        let mut state = self.state.write().map_err(poisoned)?;

        let stored = Message {
            id: Uuid::new_v4(),
            audience: message.audience,
            sender_id: message.sender_id,
            content: message.content,
            priority: message.priority,
            status: message.status,
            metadata: message.metadata,
            created_at: Utc::now(),
            expires_at: message.expires_at,
        };

        let seq = state.next_seq;
        state.next_seq += 1;
        state.messages.insert(stored.id, (seq, stored.clone()));
        Ok(stored)
    }

    async fn find(&self, id: Uuid) -> StoreResult<Option<Message>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state.messages.get(&id).map(|(_, m)| m.clone()))
    }

    async fn list_visible_to(
        &self,
        user_id: Uuid,
        filter: &MessageFilter,
        now: DateTime<Utc>,
    ) -> StoreResult<Vec<Message>> {
        let state = self.state.read().map_err(poisoned)?;

        let mut visible: Vec<&(u64, Message)> = state
            .messages
            .values()
            .filter(|(_, m)| m.is_visible_to(user_id) && !m.is_expired(now) && filter.matches(m))
            .collect();
        visible.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });

        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(visible
            .into_iter()
            .take(limit)
            .map(|(_, m)| m.clone())
            .collect())
    }

    async fn upsert_read_receipt(
        &self,
        message_id: Uuid,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(poisoned)?;
        match state.receipts.entry((message_id, user_id)) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(ReadReceipt {
                    message_id,
                    user_id,
                    read_at,
                });
                Ok(true)
            }
        }
    }

    async fn set_status(&self, id: Uuid, status: MessageStatus) -> StoreResult<Option<Message>> {
        let mut state = self.state.write().map_err(poisoned)?;
        Ok(state.messages.get_mut(&id).map(|(_, m)| {
            m.status = m.status.advance(status);
            m.clone()
        }))
    }

    async fn read_message_ids(&self, user_id: Uuid) -> StoreResult<HashSet<Uuid>> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(state
            .receipts
            .values()
            .filter(|r| r.user_id == user_id)
            .map(|r| r.message_id)
            .collect())
    }

    async fn delete(&self, id: Uuid) -> StoreResult<bool> {
        let mut state = self.state.write().map_err(poisoned)?;
        let removed = state.messages.remove(&id).is_some();
        if removed {
            state.receipts.retain(|(message_id, _), _| *message_id != id);
        }
        Ok(removed)
    }
}
