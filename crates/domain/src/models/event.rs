//! Push events delivered over the server-to-client stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::message::Message;
use super::performance_alert::PerformanceAlert;

pub const EVENT_CONNECTED: &str = "connected";
pub const EVENT_NEW_MESSAGE: &str = "new_message";
pub const EVENT_MESSAGE_READ: &str = "message_read";
pub const EVENT_NEW_ALERT: &str = "new_alert";
pub const EVENT_ONLINE_USERS: &str = "online_users";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedPayload {
    pub user_id: Uuid,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageReadPayload {
    pub message_id: Uuid,
    pub read_by: Uuid,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUsersPayload {
    pub user_ids: Vec<Uuid>,
    pub count: usize,
}

impl OnlineUsersPayload {
    pub fn new(user_ids: Vec<Uuid>) -> Self {
        let count = user_ids.len();
        Self { user_ids, count }
    }
}

/// A typed push event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    Connected(ConnectedPayload),
    NewMessage(Message),
    MessageRead(MessageReadPayload),
    NewAlert(PerformanceAlert),
    OnlineUsers(OnlineUsersPayload),
}

impl PushEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            PushEvent::Connected(_) => EVENT_CONNECTED,
            PushEvent::NewMessage(_) => EVENT_NEW_MESSAGE,
            PushEvent::MessageRead(_) => EVENT_MESSAGE_READ,
            PushEvent::NewAlert(_) => EVENT_NEW_ALERT,
            PushEvent::OnlineUsers(_) => EVENT_ONLINE_USERS,
        }
    }

    /// Frames the event for the wire, stamped with `timestamp`.
    pub fn to_frame(&self, timestamp: DateTime<Utc>) -> Result<EventFrame, serde_json::Error> {
        let data = match self {
            PushEvent::Connected(p) => serde_json::to_value(p)?,
            PushEvent::NewMessage(m) => serde_json::to_value(m)?,
            PushEvent::MessageRead(p) => serde_json::to_value(p)?,
            PushEvent::NewAlert(a) => serde_json::to_value(a)?,
            PushEvent::OnlineUsers(p) => serde_json::to_value(p)?,
        };
        Ok(EventFrame {
            event_type: self.event_type().to_string(),
            data,
            timestamp,
        })
    }
}

/// Wire frame: `{type, data, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl EventFrame {
    /// Decodes the payload back into a typed event.
    ///
    /// Fails for unknown event types or malformed data.
    pub fn into_event(self) -> Result<PushEvent, serde_json::Error> {
        serde_json::from_value(json!({
            "type": self.event_type,
            "data": self.data,
        }))
    }
}
