//! Message domain model.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use shared::validation::{
    validate_message_content, BROADCAST_CONTENT_MAX_CHARS, DIRECT_CONTENT_MAX_CHARS,
};

/// Opaque key-value metadata attached to a message.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Metadata key naming the subsystem that originated a message.
pub const METADATA_SOURCE_KEY: &str = "source";

/// Metadata source value for messages produced by the alert engine.
pub const ALERT_MESSAGE_SOURCE: &str = "performance_alert";

/// Metadata key linking an alert-originated message to its alert.
pub const METADATA_ALERT_ID_KEY: &str = "alertId";

/// Message priority, ordered from least to most pressing.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    #[default]
    Normal,
    High,
    Urgent,
}

impl MessagePriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagePriority::Normal => "normal",
            MessagePriority::High => "high",
            MessagePriority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessagePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(MessagePriority::Normal),
            "high" => Ok(MessagePriority::High),
            "urgent" => Ok(MessagePriority::Urgent),
            _ => Err(format!("Unknown message priority: {}", s)),
        }
    }
}

/// Delivery status of a message.
///
/// Variants are declared in lifecycle order; a status only ever moves
/// forward (`sending -> sent -> read`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Read,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageStatus::Sending => "sending",
            MessageStatus::Sent => "sent",
            MessageStatus::Read => "read",
        }
    }

    /// Returns the later of the current and proposed status.
    pub fn advance(self, next: MessageStatus) -> MessageStatus {
        self.max(next)
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sending" => Ok(MessageStatus::Sending),
            "sent" => Ok(MessageStatus::Sent),
            "read" => Ok(MessageStatus::Read),
            _ => Err(format!("Unknown message status: {}", s)),
        }
    }
}

/// Message kind, used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Broadcast,
    Direct,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Broadcast => "broadcast",
            MessageKind::Direct => "direct",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "broadcast" => Ok(MessageKind::Broadcast),
            "direct" => Ok(MessageKind::Direct),
            _ => Err(format!("Unknown message kind: {}", s)),
        }
    }
}

/// Who a message is addressed to.
///
/// A direct message cannot be constructed without a recipient, and a
/// broadcast has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Audience {
    Broadcast,
    Direct {
        #[serde(rename = "recipientId")]
        recipient_id: Uuid,
    },
}

impl Audience {
    pub fn kind(&self) -> MessageKind {
        match self {
            Audience::Broadcast => MessageKind::Broadcast,
            Audience::Direct { .. } => MessageKind::Direct,
        }
    }

    pub fn recipient_id(&self) -> Option<Uuid> {
        match self {
            Audience::Broadcast => None,
            Audience::Direct { recipient_id } => Some(*recipient_id),
        }
    }

    /// Rebuilds an audience from its stored column pair.
    pub fn from_parts(kind: MessageKind, recipient_id: Option<Uuid>) -> Result<Self, String> {
        match (kind, recipient_id) {
            (MessageKind::Broadcast, None) => Ok(Audience::Broadcast),
            (MessageKind::Direct, Some(recipient_id)) => Ok(Audience::Direct { recipient_id }),
            (MessageKind::Broadcast, Some(_)) => {
                Err("Broadcast message must not have a recipient".to_string())
            }
            (MessageKind::Direct, None) => Err("Direct message requires a recipient".to_string()),
        }
    }
}

/// A persisted broadcast or direct message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    #[serde(flatten)]
    pub audience: Audience,
    pub sender_id: Uuid,
    pub content: String,
    pub priority: MessagePriority,
    pub status: MessageStatus,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn kind(&self) -> MessageKind {
        self.audience.kind()
    }

    pub fn recipient_id(&self) -> Option<Uuid> {
        self.audience.recipient_id()
    }

    /// Whether `user_id` may see this message: as sender, as recipient, or
    /// because it is a broadcast.
    pub fn is_visible_to(&self, user_id: Uuid) -> bool {
        match self.audience {
            Audience::Broadcast => true,
            Audience::Direct { recipient_id } => {
                recipient_id == user_id || self.sender_id == user_id
            }
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// The other participant of a direct conversation, seen from `me`.
    ///
    /// Returns `None` for broadcasts, which have no conversation partner.
    pub fn conversation_partner(&self, me: Uuid) -> Option<Uuid> {
        match self.audience {
            Audience::Broadcast => None,
            Audience::Direct { recipient_id } if self.sender_id == me => Some(recipient_id),
            Audience::Direct { .. } => Some(self.sender_id),
        }
    }

    /// Whether this message was produced by the alert engine.
    pub fn is_alert_notice(&self) -> bool {
        self.metadata
            .get(METADATA_SOURCE_KEY)
            .and_then(|v| v.as_str())
            .is_some_and(|s| s == ALERT_MESSAGE_SOURCE)
    }

    /// Whether this message counts against `user_id`'s unread total.
    ///
    /// `read_ids` holds the ids the user has read receipts for.
    pub fn is_unread_for(&self, user_id: Uuid, read_ids: &std::collections::HashSet<Uuid>) -> bool {
        if self.sender_id == user_id {
            return false;
        }
        match self.audience {
            Audience::Broadcast => !read_ids.contains(&self.id),
            Audience::Direct { recipient_id } => {
                recipient_id == user_id && self.status != MessageStatus::Read
            }
        }
    }
}

/// A message ready to be persisted. The store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub audience: Audience,
    pub sender_id: Uuid,
    pub content: String,
    pub priority: MessagePriority,
    pub status: MessageStatus,
    pub metadata: Metadata,
    pub expires_at: Option<DateTime<Utc>>,
}

/// One read receipt per (message, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

fn validate_broadcast_content(content: &str) -> Result<(), ValidationError> {
    validate_message_content(content, BROADCAST_CONTENT_MAX_CHARS)
}

fn validate_direct_content(content: &str) -> Result<(), ValidationError> {
    validate_message_content(content, DIRECT_CONTENT_MAX_CHARS)
}

/// Request payload for sending a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendBroadcastRequest {
    #[validate(custom(function = "validate_broadcast_content"))]
    pub content: String,

    #[serde(default)]
    pub priority: MessagePriority,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SendBroadcastRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            priority: MessagePriority::Normal,
            metadata: Metadata::new(),
            expires_at: None,
        }
    }
}

/// Request payload for sending a direct message.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendDirectMessageRequest {
    #[validate(required(message = "recipientId is required"))]
    pub recipient_id: Option<Uuid>,

    #[validate(custom(function = "validate_direct_content"))]
    pub content: String,

    #[serde(default)]
    pub priority: MessagePriority,

    #[serde(default)]
    pub metadata: Metadata,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl SendDirectMessageRequest {
    pub fn new(recipient_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            recipient_id: Some(recipient_id),
            content: content.into(),
            priority: MessagePriority::Normal,
            metadata: Metadata::new(),
            expires_at: None,
        }
    }
}

/// Narrowing filters for message listings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageFilter {
    pub kind: Option<MessageKind>,
    pub status: Option<MessageStatus>,
    pub priority: Option<MessagePriority>,
    pub sender_id: Option<Uuid>,
    pub recipient_id: Option<Uuid>,
    pub limit: Option<usize>,
}

impl MessageFilter {
    /// Whether `message` passes every filter except the result cap.
    pub fn matches(&self, message: &Message) -> bool {
        self.kind.map_or(true, |k| message.kind() == k)
            && self.status.map_or(true, |s| message.status == s)
            && self.priority.map_or(true, |p| message.priority == p)
            && self.sender_id.map_or(true, |id| message.sender_id == id)
            && self
                .recipient_id
                .map_or(true, |id| message.recipient_id() == Some(id))
    }
}

/// Query parameters for listing messages.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMessagesQuery {
    #[serde(rename = "type")]
    pub kind: Option<MessageKind>,
    pub recipient_id: Option<Uuid>,
    pub sender_id: Option<Uuid>,
    pub status: Option<MessageStatus>,
    pub priority: Option<MessagePriority>,
    pub limit: Option<usize>,
}

impl From<ListMessagesQuery> for MessageFilter {
    fn from(q: ListMessagesQuery) -> Self {
        Self {
            kind: q.kind,
            status: q.status,
            priority: q.priority,
            sender_id: q.sender_id,
            recipient_id: q.recipient_id,
            limit: q.limit,
        }
    }
}

/// A sent message plus informational fan-out feedback.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessageResponse {
    #[serde(flatten)]
    pub message: Message,
    /// Number of sessions connected when the message was published. This is
    /// not a delivery count.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient_count: Option<usize>,
}

/// Messages visible to a user, grouped for the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedMessages {
    pub broadcasts: Vec<Message>,
    pub direct: Vec<Message>,
    pub alerts: Vec<Message>,
    pub total: usize,
}

impl GroupedMessages {
    /// Splits an already-ordered listing into buckets, preserving order.
    pub fn from_messages(messages: Vec<Message>) -> Self {
        let total = messages.len();
        let mut grouped = GroupedMessages {
            total,
            ..Default::default()
        };
        for message in messages {
            match message.audience {
                Audience::Broadcast => grouped.broadcasts.push(message),
                Audience::Direct { .. } if message.is_alert_notice() => {
                    grouped.alerts.push(message)
                }
                Audience::Direct { .. } => grouped.direct.push(message),
            }
        }
        grouped
    }
}

/// Unread counter for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub unread_count: usize,
    pub total_messages: usize,
}

/// Sorts messages newest first. Ties keep their existing relative order.
pub fn sort_newest_first(messages: &mut [Message]) {
    messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}
