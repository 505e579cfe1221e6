//! Local message and alert state.
//!
//! Direct messages are grouped by conversation partner: the sender when the
//! local user received the message, otherwise the recipient.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use domain::models::event::MessageReadPayload;
use domain::models::message::{GroupedMessages, Metadata};
use domain::models::{Audience, Message, MessagePriority, MessageStatus, PerformanceAlert, PushEvent};
use uuid::Uuid;

/// Everything the dashboard renders for one user.
#[derive(Debug, Clone)]
pub struct ClientState {
    me: Uuid,
    broadcasts: Vec<Message>,
    direct: BTreeMap<Uuid, Vec<Message>>,
    alerts: Vec<PerformanceAlert>,
    unread: HashMap<Uuid, usize>,
    pending: HashSet<Uuid>,
    /// Broadcasts the local user has read. Read receipts for broadcasts are
    /// per reader, so the shared message keeps its `sent` status.
    read_broadcasts: HashSet<Uuid>,
    online: Vec<Uuid>,
    connected_at: Option<DateTime<Utc>>,
}

impl ClientState {
    pub fn new(me: Uuid) -> Self {
        Self {
            me,
            broadcasts: Vec::new(),
            direct: BTreeMap::new(),
            alerts: Vec::new(),
            unread: HashMap::new(),
            pending: HashSet::new(),
            read_broadcasts: HashSet::new(),
            online: Vec::new(),
            connected_at: None,
        }
    }

    pub fn me(&self) -> Uuid {
        self.me
    }

    pub fn broadcasts(&self) -> &[Message] {
        &self.broadcasts
    }

    /// The conversation with `partner`, oldest first.
    pub fn conversation(&self, partner: Uuid) -> &[Message] {
        self.direct.get(&partner).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn partners(&self) -> impl Iterator<Item = &Uuid> {
        self.direct.keys()
    }

    /// Alerts, newest first.
    pub fn alerts(&self) -> &[PerformanceAlert] {
        &self.alerts
    }

    pub fn unread_from(&self, partner: Uuid) -> usize {
        self.unread.get(&partner).copied().unwrap_or(0)
    }

    pub fn total_unread(&self) -> usize {
        self.unread.values().sum()
    }

    pub fn online_users(&self) -> &[Uuid] {
        &self.online
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    pub fn is_pending(&self, id: Uuid) -> bool {
        self.pending.contains(&id)
    }

    /// Whether the local user has read the message.
    pub fn is_read_by_me(&self, id: Uuid) -> bool {
        match self.find(id) {
            Some(message) if message.audience == Audience::Broadcast => {
                self.read_broadcasts.contains(&id)
            }
            Some(message) => message.status == MessageStatus::Read,
            None => false,
        }
    }

    /// Looks a message up by id in every bucket.
    pub fn find(&self, id: Uuid) -> Option<&Message> {
        self.broadcasts
            .iter()
            .chain(self.direct.values().flatten())
            .find(|m| m.id == id)
    }

    fn find_mut(&mut self, id: Uuid) -> Option<&mut Message> {
        self.broadcasts
            .iter_mut()
            .chain(self.direct.values_mut().flatten())
            .find(|m| m.id == id)
    }

    fn partner_of(&self, message: &Message) -> Option<Uuid> {
        message.conversation_partner(self.me)
    }

    fn bucket_mut(&mut self, message: &Message) -> &mut Vec<Message> {
        match self.partner_of(message) {
            Some(partner) => self.direct.entry(partner).or_default(),
            None => &mut self.broadcasts,
        }
    }

    /// Inserts a locally-authored message in `sending` state and returns its
    /// temporary id.
    pub fn insert_pending(
        &mut self,
        audience: Audience,
        content: String,
        priority: MessagePriority,
        metadata: Metadata,
    ) -> Uuid {
        let temp_id = Uuid::new_v4();
        let message = Message {
            id: temp_id,
            audience,
            sender_id: self.me,
            content,
            priority,
            status: MessageStatus::Sending,
            metadata,
            created_at: Utc::now(),
            expires_at: None,
        };
        self.bucket_mut(&message).push(message);
        self.pending.insert(temp_id);
        temp_id
    }

    /// Replaces the pending entry with the server's copy, in place.
    ///
    /// When a push already delivered the server copy, the pending entry is
    /// dropped instead so the message appears once.
    pub fn confirm(&mut self, temp_id: Uuid, server: Message) {
        if !self.pending.remove(&temp_id) {
            tracing::debug!(temp_id = %temp_id, "Confirmation for unknown pending message");
            self.merge_message(server);
            return;
        }

        let already_pushed = self.find(server.id).is_some();
        let bucket = self.bucket_mut(&server);
        let Some(position) = bucket.iter().position(|m| m.id == temp_id) else {
            if !already_pushed {
                bucket.push(server);
            }
            return;
        };

        if already_pushed {
            bucket.remove(position);
        } else {
            bucket[position] = server;
        }
    }

    /// Removes a pending entry after its send failed.
    pub fn discard(&mut self, temp_id: Uuid) -> bool {
        if !self.pending.remove(&temp_id) {
            return false;
        }
        self.broadcasts.retain(|m| m.id != temp_id);
        for conversation in self.direct.values_mut() {
            conversation.retain(|m| m.id != temp_id);
        }
        self.direct.retain(|_, conversation| !conversation.is_empty());
        true
    }

    /// Applies one pushed event.
    pub fn apply(&mut self, event: PushEvent) {
        match event {
            PushEvent::Connected(payload) => self.connected_at = Some(payload.connected_at),
            PushEvent::NewMessage(message) => self.merge_message(message),
            PushEvent::MessageRead(payload) => self.apply_read(&payload),
            PushEvent::NewAlert(alert) => {
                if !self.alerts.iter().any(|a| a.id == alert.id) {
                    self.alerts.insert(0, alert);
                }
            }
            PushEvent::OnlineUsers(payload) => self.online = payload.user_ids,
        }
    }

    /// Appends a server message to its bucket.
    ///
    /// Only the id is checked; two messages with the same content are kept.
    fn merge_message(&mut self, message: Message) {
        if self.find(message.id).is_some() {
            return;
        }
        if message.sender_id != self.me && message.status != MessageStatus::Read {
            if let Some(partner) = self.partner_of(&message) {
                *self.unread.entry(partner).or_insert(0) += 1;
            }
        }
        self.bucket_mut(&message).push(message);
    }

    /// A reader of a broadcast does not change its status for anyone else.
    fn apply_read(&mut self, payload: &MessageReadPayload) {
        if let Some(message) = self.find_mut(payload.message_id) {
            if message.audience != Audience::Broadcast {
                message.status = message.status.advance(MessageStatus::Read);
            }
        }
    }

    /// Marks a received message read locally.
    ///
    /// A direct message addressed to the local user becomes `read`. A
    /// broadcast is only recorded as read by the local user. Returns false
    /// when the message is unknown, already read, authored locally, or a
    /// direct message to someone else.
    pub fn mark_read_local(&mut self, id: Uuid) -> bool {
        let me = self.me;
        let Some(message) = self.find_mut(id) else {
            return false;
        };
        if message.sender_id == me {
            return false;
        }
        match message.audience {
            Audience::Broadcast => return self.read_broadcasts.insert(id),
            Audience::Direct { recipient_id } if recipient_id != me => return false,
            Audience::Direct { .. } => {}
        }
        if message.status == MessageStatus::Read {
            return false;
        }
        message.status = MessageStatus::Read;
        let partner = message.conversation_partner(me);

        if let Some(partner) = partner {
            if let Some(count) = self.unread.get_mut(&partner) {
                *count = count.saturating_sub(1);
            }
        }
        true
    }

    /// Replaces every bucket with a fresh server listing.
    ///
    /// Pending local sends survive so their confirmation still lands.
    pub fn replace(&mut self, grouped: GroupedMessages, alerts: Vec<PerformanceAlert>) {
        let pending: Vec<Message> = self
            .broadcasts
            .iter()
            .chain(self.direct.values().flatten())
            .filter(|m| self.pending.contains(&m.id))
            .cloned()
            .collect();

        self.broadcasts.clear();
        self.direct.clear();
        self.unread.clear();

        // Listings arrive newest first; buckets hold oldest first.
        let mut messages: Vec<Message> = grouped
            .broadcasts
            .into_iter()
            .chain(grouped.direct)
            .chain(grouped.alerts)
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        for message in messages {
            self.merge_message(message);
        }
        for message in pending {
            self.bucket_mut(&message).push(message);
        }

        self.alerts = alerts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::event::{ConnectedPayload, OnlineUsersPayload};
    use domain::models::AlertSeverity;

    fn server_message(audience: Audience, sender_id: Uuid, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            audience,
            sender_id,
            content: content.to_string(),
            priority: MessagePriority::Normal,
            status: MessageStatus::Sent,
            metadata: Metadata::new(),
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    fn alert(player_id: Uuid) -> PerformanceAlert {
        PerformanceAlert {
            id: Uuid::new_v4(),
            rule_id: None,
            player_id,
            alert_type: "performance".to_string(),
            severity: AlertSeverity::Warning,
            metric: "benchmark_hit_rate".to_string(),
            current_value: 42.0,
            threshold_value: 50.0,
            message: "Hit rate is 42.00".to_string(),
            action_required: false,
            acknowledged: false,
            acknowledged_by: None,
            acknowledged_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_confirm_replaces_in_place() {
        let me = Uuid::new_v4();
        let mut state = ClientState::new(me);
        let earlier = server_message(Audience::Broadcast, Uuid::new_v4(), "earlier");
        state.apply(PushEvent::NewMessage(earlier.clone()));

        let temp_id = state.insert_pending(
            Audience::Broadcast,
            "Lift at 6".to_string(),
            MessagePriority::High,
            Metadata::new(),
        );
        let later = server_message(Audience::Broadcast, Uuid::new_v4(), "later");
        state.apply(PushEvent::NewMessage(later.clone()));
        assert_eq!(state.broadcasts()[1].status, MessageStatus::Sending);

        let mut confirmed = server_message(Audience::Broadcast, me, "Lift at 6");
        confirmed.priority = MessagePriority::High;
        state.confirm(temp_id, confirmed.clone());

        let ids: Vec<Uuid> = state.broadcasts().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![earlier.id, confirmed.id, later.id]);
        assert_eq!(state.broadcasts()[1].status, MessageStatus::Sent);
        assert!(!state.is_pending(temp_id));
    }

    #[test]
    fn test_confirm_after_push_keeps_one_copy() {
        let me = Uuid::new_v4();
        let mut state = ClientState::new(me);
        let temp_id = state.insert_pending(
            Audience::Broadcast,
            "Team photo".to_string(),
            MessagePriority::Normal,
            Metadata::new(),
        );

        let server = server_message(Audience::Broadcast, me, "Team photo");
        state.apply(PushEvent::NewMessage(server.clone()));
        state.confirm(temp_id, server.clone());

        assert_eq!(state.broadcasts().len(), 1);
        assert_eq!(state.broadcasts()[0].id, server.id);
    }

    #[test]
    fn test_discard_removes_pending_entry() {
        let me = Uuid::new_v4();
        let partner = Uuid::new_v4();
        let mut state = ClientState::new(me);
        let temp_id = state.insert_pending(
            Audience::Direct {
                recipient_id: partner,
            },
            "See me".to_string(),
            MessagePriority::Normal,
            Metadata::new(),
        );
        assert_eq!(state.conversation(partner).len(), 1);

        assert!(state.discard(temp_id));
        assert!(state.conversation(partner).is_empty());
        assert_eq!(state.partners().count(), 0);
        assert!(!state.discard(temp_id));
    }

    #[test]
    fn test_direct_messages_group_by_partner() {
        let me = Uuid::new_v4();
        let partner = Uuid::new_v4();
        let mut state = ClientState::new(me);

        let incoming = server_message(Audience::Direct { recipient_id: me }, partner, "Question");
        let outgoing = server_message(
            Audience::Direct {
                recipient_id: partner,
            },
            me,
            "Answer",
        );
        state.apply(PushEvent::NewMessage(incoming));
        state.apply(PushEvent::NewMessage(outgoing));

        assert_eq!(state.conversation(partner).len(), 2);
        assert_eq!(state.unread_from(partner), 1);
        assert!(state.broadcasts().is_empty());
    }

    #[test]
    fn test_same_content_is_not_deduplicated() {
        let me = Uuid::new_v4();
        let coach = Uuid::new_v4();
        let mut state = ClientState::new(me);

        state.apply(PushEvent::NewMessage(server_message(
            Audience::Broadcast,
            coach,
            "Hydrate",
        )));
        state.apply(PushEvent::NewMessage(server_message(
            Audience::Broadcast,
            coach,
            "Hydrate",
        )));

        assert_eq!(state.broadcasts().len(), 2);
    }

    #[test]
    fn test_read_event_updates_any_bucket() {
        let me = Uuid::new_v4();
        let partner = Uuid::new_v4();
        let mut state = ClientState::new(me);
        let outgoing = server_message(
            Audience::Direct {
                recipient_id: partner,
            },
            me,
            "Film at 3",
        );
        state.apply(PushEvent::NewMessage(outgoing.clone()));

        state.apply(PushEvent::MessageRead(MessageReadPayload {
            message_id: outgoing.id,
            read_by: partner,
            read_at: Utc::now(),
        }));

        assert_eq!(
            state.find(outgoing.id).unwrap().status,
            MessageStatus::Read
        );
    }

    #[test]
    fn test_mark_read_local_decrements_unread() {
        let me = Uuid::new_v4();
        let partner = Uuid::new_v4();
        let mut state = ClientState::new(me);
        let incoming = server_message(Audience::Direct { recipient_id: me }, partner, "Call me");
        state.apply(PushEvent::NewMessage(incoming.clone()));
        assert_eq!(state.total_unread(), 1);

        assert!(state.mark_read_local(incoming.id));
        assert_eq!(state.unread_from(partner), 0);
        assert!(!state.mark_read_local(incoming.id));
        assert_eq!(state.unread_from(partner), 0);
    }

    #[test]
    fn test_reading_broadcast_is_tracked_per_user() {
        let me = Uuid::new_v4();
        let coach = Uuid::new_v4();
        let mut state = ClientState::new(me);
        let broadcast = server_message(Audience::Broadcast, coach, "Bus leaves at 7");
        state.apply(PushEvent::NewMessage(broadcast.clone()));

        assert!(!state.is_read_by_me(broadcast.id));
        assert!(state.mark_read_local(broadcast.id));
        assert!(!state.mark_read_local(broadcast.id));

        assert!(state.is_read_by_me(broadcast.id));
        assert_eq!(state.find(broadcast.id).unwrap().status, MessageStatus::Sent);

        // A fresh listing still reports the broadcast as sent.
        let grouped = GroupedMessages::from_messages(vec![broadcast.clone()]);
        state.replace(grouped, Vec::new());
        assert_eq!(state.find(broadcast.id).unwrap().status, MessageStatus::Sent);
        assert!(state.is_read_by_me(broadcast.id));
    }

    #[test]
    fn test_direct_to_someone_else_is_not_marked_read() {
        let me = Uuid::new_v4();
        let coach = Uuid::new_v4();
        let mut state = ClientState::new(me);
        let misrouted = server_message(
            Audience::Direct {
                recipient_id: Uuid::new_v4(),
            },
            coach,
            "Not for you",
        );
        state.apply(PushEvent::NewMessage(misrouted.clone()));

        assert!(!state.mark_read_local(misrouted.id));
        assert_eq!(state.find(misrouted.id).unwrap().status, MessageStatus::Sent);
    }

    #[test]
    fn test_read_event_leaves_broadcast_sent() {
        let me = Uuid::new_v4();
        let mut state = ClientState::new(me);
        let broadcast = server_message(Audience::Broadcast, me, "Practice cancelled");
        state.apply(PushEvent::NewMessage(broadcast.clone()));

        state.apply(PushEvent::MessageRead(MessageReadPayload {
            message_id: broadcast.id,
            read_by: Uuid::new_v4(),
            read_at: Utc::now(),
        }));

        assert_eq!(state.find(broadcast.id).unwrap().status, MessageStatus::Sent);
    }

    #[test]
    fn test_alerts_prepend_newest() {
        let me = Uuid::new_v4();
        let mut state = ClientState::new(me);
        let first = alert(me);
        let second = alert(me);

        state.apply(PushEvent::NewAlert(first.clone()));
        state.apply(PushEvent::NewAlert(second.clone()));

        let ids: Vec<Uuid> = state.alerts().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_presence_and_connection_events() {
        let me = Uuid::new_v4();
        let mut state = ClientState::new(me);
        let now = Utc::now();

        state.apply(PushEvent::Connected(ConnectedPayload {
            user_id: me,
            connected_at: now,
        }));
        state.apply(PushEvent::OnlineUsers(OnlineUsersPayload::new(vec![me])));

        assert_eq!(state.connected_at(), Some(now));
        assert_eq!(state.online_users(), &[me]);
    }

    #[test]
    fn test_replace_keeps_pending_sends() {
        let me = Uuid::new_v4();
        let coach = Uuid::new_v4();
        let mut state = ClientState::new(me);
        state.apply(PushEvent::NewMessage(server_message(
            Audience::Broadcast,
            coach,
            "stale",
        )));
        let temp_id = state.insert_pending(
            Audience::Broadcast,
            "in flight".to_string(),
            MessagePriority::Normal,
            Metadata::new(),
        );

        let fresh = server_message(Audience::Direct { recipient_id: me }, coach, "fresh");
        let grouped = GroupedMessages::from_messages(vec![fresh.clone()]);
        state.replace(grouped, vec![alert(me)]);

        assert_eq!(state.broadcasts().len(), 1);
        assert_eq!(state.broadcasts()[0].id, temp_id);
        assert_eq!(state.conversation(coach)[0].id, fresh.id);
        assert_eq!(state.unread_from(coach), 1);
        assert_eq!(state.alerts().len(), 1);
    }
}
