//! Messaging API client.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use domain::models::message::{GroupedMessages, SendBroadcastRequest, SendDirectMessageRequest};
use domain::models::{EventFrame, Message, PerformanceAlert};
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ClientError;
use crate::stream::EventStreamDecoder;

/// Header carrying the caller's identity.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// Request timeout for non-streaming calls.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// The server operations the reconciler needs.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn send_broadcast(&self, request: &SendBroadcastRequest) -> Result<Message, ClientError>;

    async fn send_direct(&self, request: &SendDirectMessageRequest)
        -> Result<Message, ClientError>;

    async fn mark_read(&self, message_id: Uuid) -> Result<Message, ClientError>;

    /// The caller's grouped message listing.
    async fn load_messages(&self) -> Result<GroupedMessages, ClientError>;

    /// Open alerts, most pressing first.
    async fn list_alerts(&self) -> Result<Vec<PerformanceAlert>, ClientError>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
    code: String,
}

#[derive(Debug, Deserialize)]
struct AlertPage {
    alerts: Vec<PerformanceAlert>,
}

/// `MessagingApi` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpMessagingApi {
    client: Client,
    base_url: String,
    user_id: Uuid,
}

impl HttpMessagingApi {
    /// Creates a client for `base_url` (for example `http://localhost:8080`)
    /// acting as `user_id`.
    pub fn new(base_url: impl Into<String>, user_id: Uuid) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidUrl(base_url));
        }

        // No overall timeout: it would cut the push stream.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url,
            user_id,
        })
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    fn request(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(USER_ID_HEADER, self.user_id.to_string())
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = check(self.request(builder).send().await?).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Opens the push stream and yields decoded frames until the server
    /// closes it.
    pub async fn subscribe(
        &self,
    ) -> Result<impl Stream<Item = Result<EventFrame, ClientError>>, ClientError> {
        let response = self
            .client
            .get(self.url("/messages/stream"))
            .query(&[("userId", self.user_id.to_string())])
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check(response).await?;

        tracing::info!(user_id = %self.user_id, "Push stream opened");

        let bytes = Box::pin(response.bytes_stream());
        let frames = stream::unfold(
            (bytes, EventStreamDecoder::new(), VecDeque::new()),
            |(mut bytes, mut decoder, mut ready)| async move {
                loop {
                    if let Some(frame) = ready.pop_front() {
                        return Some((frame, (bytes, decoder, ready)));
                    }
                    match bytes.next().await {
                        Some(Ok(chunk)) => ready.extend(decoder.push(&chunk)),
                        Some(Err(e)) => {
                            return Some((Err(ClientError::Http(e)), (bytes, decoder, ready)))
                        }
                        None => return None,
                    }
                }
            },
        );
        Ok(frames)
    }
}

/// Turns a non-success response into `ClientError::Api`.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let bytes = response.bytes().await?;
    let (code, message) = match serde_json::from_slice::<ErrorBody>(&bytes) {
        Ok(body) => (body.code, body.error),
        Err(_) => (
            "unknown".to_string(),
            String::from_utf8_lossy(&bytes).into_owned(),
        ),
    };
    Err(ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

#[async_trait]
impl MessagingApi for HttpMessagingApi {
    async fn send_broadcast(&self, request: &SendBroadcastRequest) -> Result<Message, ClientError> {
        self.send(self.client.post(self.url("/messages/broadcast")).json(request))
            .await
    }

    async fn send_direct(
        &self,
        request: &SendDirectMessageRequest,
    ) -> Result<Message, ClientError> {
        self.send(self.client.post(self.url("/messages/direct")).json(request))
            .await
    }

    async fn mark_read(&self, message_id: Uuid) -> Result<Message, ClientError> {
        let path = format!("/messages/{}/read", message_id);
        self.send(self.client.patch(self.url(&path))).await
    }

    async fn load_messages(&self) -> Result<GroupedMessages, ClientError> {
        self.send(self.client.get(self.url("/messages"))).await
    }

    async fn list_alerts(&self) -> Result<Vec<PerformanceAlert>, ClientError> {
        let page: AlertPage = self
            .send(
                self.client
                    .get(self.url("/alerts"))
                    .query(&[("acknowledged", "false")]),
            )
            .await?;
        Ok(page.alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let api = HttpMessagingApi::new("http://localhost:8080/", Uuid::nil()).unwrap();
        assert_eq!(api.url("/messages"), "http://localhost:8080/api/v1/messages");
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        assert!(matches!(
            HttpMessagingApi::new("localhost:8080", Uuid::nil()),
            Err(ClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_sent_message_response_decodes_as_message() {
        let body = serde_json::json!({
            "id": Uuid::new_v4(),
            "kind": "broadcast",
            "senderId": Uuid::new_v4(),
            "content": "Practice at 5",
            "priority": "normal",
            "status": "sent",
            "metadata": {},
            "createdAt": "2026-03-01T12:00:00Z",
            "recipientCount": 3
        });
        let message: Message = serde_json::from_value(body).unwrap();
        assert_eq!(message.content, "Practice at 5");
    }
}
