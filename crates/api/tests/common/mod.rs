//! Common test utilities for integration tests.
//!
//! Every app built here runs on the in-memory backend, so no database is
//! needed.

// Helpers are shared across test binaries; each uses a subset.
#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    Router,
};
use domain::models::Player;
use fake::{faker::name::en::Name, Fake};
use persistence::memory::{InMemoryPlayerMetrics, InMemoryRoster};
use persistence::Stores;
use sideline_api::app::{create_router, AppState};
use sideline_api::config::Config;
use sideline_api::extractors::USER_ID_HEADER;
use uuid::Uuid;

/// Test configuration on the in-memory backend with the scheduler off.
pub fn test_config() -> Config {
    Config::load_for_test(&[]).expect("test config should load")
}

/// Roster and metrics a test seeds before building the app.
#[derive(Default)]
pub struct Seed {
    pub roster: InMemoryRoster,
    pub metrics: InMemoryPlayerMetrics,
}

impl Seed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a player with a generated name.
    pub fn player(&self) -> Player {
        let name: String = Name().fake();
        self.add(Player::new(Uuid::new_v4(), name))
    }

    pub fn named_player(&self, name: &str) -> Player {
        self.add(Player::new(Uuid::new_v4(), name))
    }

    fn add(&self, player: Player) -> Player {
        self.roster.add_player(player.clone()).unwrap();
        player
    }

    pub fn set_metric(&self, player: &Player, metric: &str, value: f64) {
        self.metrics.set_current(player.id, metric, value).unwrap();
    }
}

/// Builds shared state over seeded in-memory stores.
pub fn create_test_state(seed: Seed) -> AppState {
    AppState::new(
        test_config(),
        Stores::from_memory(seed.roster, seed.metrics),
        None,
    )
}

pub fn create_test_app(seed: Seed) -> Router {
    create_router(create_test_state(seed))
}

/// A router over existing state, for tests that inspect the registry.
pub fn create_router_for(state: &AppState) -> Router {
    create_router(state.clone())
}

/// Build a JSON request acting as `user`.
pub fn json_request(
    method: Method,
    uri: &str,
    body: serde_json::Value,
    user: Uuid,
) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(USER_ID_HEADER, user.to_string())
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

/// Build a body-less request acting as `user`.
pub fn request(method: Method, uri: &str, user: Uuid) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_ID_HEADER, user.to_string())
        .body(Body::empty())
        .unwrap()
}

pub fn get_request(uri: &str, user: Uuid) -> Request<Body> {
    request(Method::GET, uri, user)
}

/// Parse response body as JSON.
pub async fn parse_response_body(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
}
