//! Server-sent event stream for real-time push.
//!
//! Each frame is sent as `event: <type>` with the JSON `{type, data,
//! timestamp}` frame as data. Heartbeats are SSE comments.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    response::sse::{Event, Sse},
};
use domain::models::event::OnlineUsersPayload;
use domain::models::PushEvent;
use domain::services::{Dispatch, Notifier, PublishResult};
use futures::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::realtime::{ConnectionRegistry, PushFrame};

/// Query parameters for opening a stream.
///
/// The identity travels in the query string because browser `EventSource`
/// cannot set headers.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamQuery {
    pub user_id: Option<Uuid>,
}

/// Open the caller's push stream, superseding any stream they already have.
///
/// GET /api/v1/messages/stream?userId=<uuid>
pub async fn subscribe(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let Query(query) = query?;
    let user_id = query
        .user_id
        .ok_or_else(|| ApiError::Unauthorized("userId query parameter is required".to_string()))?;

    let (sender, receiver) = mpsc::channel(state.config.realtime.channel_capacity);
    let connection_id = state
        .registry
        .register(user_id, sender)
        .await
        .map_err(|e| ApiError::ServiceUnavailable(format!("Could not open stream: {}", e)))?;

    publish_presence(&state.registry, state.notifier.as_ref());

    let guard = ConnectionGuard {
        registry: state.registry.clone(),
        notifier: Arc::clone(&state.notifier),
        user_id,
        connection_id,
    };

    let events = stream::unfold((receiver, guard), |(mut receiver, guard)| async move {
        let frame = receiver.recv().await?;
        Some((Ok::<_, Infallible>(to_sse_event(frame)), (receiver, guard)))
    });

    Ok(Sse::new(events))
}

/// Renders a push frame as an SSE event.
pub fn to_sse_event(frame: PushFrame) -> Event {
    match frame {
        PushFrame::Heartbeat => Event::default().comment("heartbeat"),
        PushFrame::Event(frame) => match serde_json::to_string(&frame) {
            Ok(json) => Event::default().event(&frame.event_type).data(json),
            Err(e) => {
                tracing::error!(
                    event_type = %frame.event_type,
                    error = %e,
                    "Failed to encode SSE frame"
                );
                Event::default().comment("encode-error")
            }
        },
    }
}

fn publish_presence(registry: &ConnectionRegistry, notifier: &dyn Notifier) {
    let event = PushEvent::OnlineUsers(OnlineUsersPayload::new(registry.online_users()));
    if let PublishResult::Dropped(reason) = notifier.publish(Dispatch::to_all(event)) {
        tracing::warn!(reason = %reason, "Presence update dropped");
    }
}

/// Deregisters the connection when its response stream is dropped.
struct ConnectionGuard {
    registry: ConnectionRegistry,
    notifier: Arc<dyn Notifier>,
    user_id: Uuid,
    connection_id: u64,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.registry.remove_connection(self.user_id, self.connection_id) {
            publish_presence(&self.registry, self.notifier.as_ref());
        }
    }
}
