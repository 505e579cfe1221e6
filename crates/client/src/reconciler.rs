//! Optimistic send and push merge over a `MessagingApi`.

use std::sync::{Mutex, MutexGuard, PoisonError};

use domain::models::message::{SendBroadcastRequest, SendDirectMessageRequest};
use domain::models::{Audience, EventFrame, Message};
use futures::{Stream, StreamExt};
use uuid::Uuid;

use crate::api::MessagingApi;
use crate::error::ClientError;
use crate::state::ClientState;

const KNOWN_EVENTS: [&str; 5] = [
    domain::models::event::EVENT_CONNECTED,
    domain::models::event::EVENT_NEW_MESSAGE,
    domain::models::event::EVENT_MESSAGE_READ,
    domain::models::event::EVENT_NEW_ALERT,
    domain::models::event::EVENT_ONLINE_USERS,
];

/// Keeps a `ClientState` in step with the server.
///
/// The state lock is never held across a network call.
pub struct Reconciler<A: MessagingApi> {
    api: A,
    state: Mutex<ClientState>,
}

impl<A: MessagingApi> Reconciler<A> {
    pub fn new(api: A, me: Uuid) -> Self {
        Self {
            api,
            state: Mutex::new(ClientState::new(me)),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> ClientState {
        self.state().clone()
    }

    /// Reads the state without copying it.
    pub fn with_state<R>(&self, f: impl FnOnce(&ClientState) -> R) -> R {
        f(&self.state())
    }

    /// Shows the broadcast at once, then swaps in the server copy.
    ///
    /// On failure the local entry is removed and the error returned.
    pub async fn send_broadcast(&self, request: SendBroadcastRequest) -> Result<Message, ClientError> {
        let temp_id = self.state().insert_pending(
            Audience::Broadcast,
            request.content.clone(),
            request.priority,
            request.metadata.clone(),
        );
        let result = self.api.send_broadcast(&request).await;
        self.settle(temp_id, result)
    }

    /// Shows the direct message at once, then swaps in the server copy.
    pub async fn send_direct(
        &self,
        request: SendDirectMessageRequest,
    ) -> Result<Message, ClientError> {
        // Without a recipient there is no conversation to show it in; the
        // server rejects it.
        let Some(recipient_id) = request.recipient_id else {
            return self.api.send_direct(&request).await;
        };

        let temp_id = self.state().insert_pending(
            Audience::Direct { recipient_id },
            request.content.clone(),
            request.priority,
            request.metadata.clone(),
        );
        let result = self.api.send_direct(&request).await;
        self.settle(temp_id, result)
    }

    fn settle(
        &self,
        temp_id: Uuid,
        result: Result<Message, ClientError>,
    ) -> Result<Message, ClientError> {
        let mut state = self.state();
        match result {
            Ok(message) => {
                state.confirm(temp_id, message.clone());
                Ok(message)
            }
            Err(e) => {
                state.discard(temp_id);
                tracing::warn!(temp_id = %temp_id, error = %e, "Send failed, local copy removed");
                Err(e)
            }
        }
    }

    /// Marks a message read on the server, then locally.
    pub async fn mark_read(&self, message_id: Uuid) -> Result<Message, ClientError> {
        let message = self.api.mark_read(message_id).await?;
        self.state().mark_read_local(message_id);
        Ok(message)
    }

    /// Replaces local state with a fresh pull from the server.
    pub async fn refresh(&self) -> Result<(), ClientError> {
        let messages = self.api.load_messages().await?;
        let alerts = self.api.list_alerts().await?;
        self.state().replace(messages, alerts);
        Ok(())
    }

    /// Merges one pushed frame.
    ///
    /// Unknown event types are ignored; a known type with a malformed
    /// payload is an error.
    pub fn apply_frame(&self, frame: EventFrame) -> Result<(), ClientError> {
        if !KNOWN_EVENTS.contains(&frame.event_type.as_str()) {
            tracing::debug!(event_type = %frame.event_type, "Ignoring unknown push event");
            return Ok(());
        }
        let event = frame.into_event()?;
        self.state().apply(event);
        Ok(())
    }

    /// Applies frames until the stream ends.
    ///
    /// Transport errors end the loop; undecodable frames are skipped.
    pub async fn follow<S>(&self, frames: S) -> Result<(), ClientError>
    where
        S: Stream<Item = Result<EventFrame, ClientError>>,
    {
        futures::pin_mut!(frames);
        while let Some(frame) = frames.next().await {
            match frame.and_then(|f| self.apply_frame(f)) {
                Ok(()) => {}
                Err(ClientError::Decode(e)) => {
                    tracing::warn!(error = %e, "Skipping undecodable push frame");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}
