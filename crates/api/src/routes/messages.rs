//! Message endpoint handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;
use domain::models::message::{
    GroupedMessages, ListMessagesQuery, Message, MessageFilter, SendBroadcastRequest,
    SendDirectMessageRequest, SentMessageResponse, UnreadCount,
};

/// Response for a deleted message.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteMessageResponse {
    pub id: Uuid,
    pub deleted: bool,
}

/// Send a message to the whole team.
///
/// POST /api/v1/messages/broadcast
pub async fn send_broadcast(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<SendBroadcastRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SentMessageResponse>), ApiError> {
    let Json(request) = payload?;
    let sent = state.messaging.send_broadcast(user.id(), request).await?;
    metrics::counter!("sideline_messages_sent_total", "kind" => "broadcast").increment(1);
    Ok((StatusCode::CREATED, Json(sent)))
}

/// Send a message to one recipient.
///
/// POST /api/v1/messages/direct
pub async fn send_direct(
    State(state): State<AppState>,
    user: CurrentUser,
    payload: Result<Json<SendDirectMessageRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let Json(request) = payload?;
    let message = state.messaging.send_direct(user.id(), request).await?;
    metrics::counter!("sideline_messages_sent_total", "kind" => "direct").increment(1);
    Ok((StatusCode::CREATED, Json(message)))
}

/// Messages visible to the caller, grouped into broadcasts, direct
/// messages and alert notices.
///
/// GET /api/v1/messages?type&recipientId&senderId&status&priority&limit
pub async fn list_messages(
    State(state): State<AppState>,
    user: CurrentUser,
    query: Result<Query<ListMessagesQuery>, QueryRejection>,
) -> Result<Json<GroupedMessages>, ApiError> {
    let Query(query) = query?;
    let filter = MessageFilter::from(query);
    let grouped = state.messaging.load_for_user(user.id(), &filter).await?;
    Ok(Json(grouped))
}

/// Mark a message as read by the caller.
///
/// PATCH /api/v1/messages/:id/read
pub async fn mark_read(
    State(state): State<AppState>,
    user: CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<Message>, ApiError> {
    let Path(message_id) = id?;
    let message = state.messaging.mark_read(message_id, user.id()).await?;
    Ok(Json(message))
}

/// Unread and total visible message counts for the caller.
///
/// GET /api/v1/messages/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<UnreadCount>, ApiError> {
    let counts = state.messaging.unread_count(user.id()).await?;
    Ok(Json(counts))
}

/// Delete a message. Only its sender may do so.
///
/// DELETE /api/v1/messages/:id
pub async fn delete_message(
    State(state): State<AppState>,
    user: CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<DeleteMessageResponse>, ApiError> {
    let Path(message_id) = id?;
    state.messaging.delete(message_id, user.id()).await?;
    Ok(Json(DeleteMessageResponse {
        id: message_id,
        deleted: true,
    }))
}
