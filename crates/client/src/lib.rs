//! Client-side view of the Sideline dashboard.
//!
//! Keeps a local copy of messages and alerts that updates immediately on
//! send, then reconciles with the server's answer and with pushed events.

pub mod api;
pub mod error;
pub mod reconciler;
pub mod state;
pub mod stream;

pub use api::{HttpMessagingApi, MessagingApi};
pub use error::ClientError;
pub use reconciler::Reconciler;
pub use state::ClientState;
pub use stream::EventStreamDecoder;
