//! Integration tests for alert rules, evaluation and alert endpoints.

mod common;

use axum::http::{Method, StatusCode};
use axum::Router;
use common::{create_test_app, get_request, json_request, parse_response_body, request, Seed};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

const HIT_RATE: &str = "benchmark_hit_rate";

fn rule(name: &str, comparison: &str, threshold: f64, severity: &str) -> serde_json::Value {
    json!({
        "name": name,
        "metricName": HIT_RATE,
        "comparison": comparison,
        "thresholdValue": threshold,
        "severity": severity,
        "alertType": "performance_decline",
        "messageTemplate": "{player_name} hit rate is {value} (threshold {threshold})"
    })
}

async fn upsert(app: &Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(json_request(
            Method::POST,
            "/api/v1/alert-rules",
            body,
            Uuid::new_v4(),
        ))
        .await
        .unwrap();
    let status = response.status();
    (status, parse_response_body(response).await)
}

async fn run_checks(app: &Router) -> serde_json::Value {
    let response = app
        .clone()
        .oneshot(request(
            Method::POST,
            "/api/v1/alert-rules/run-checks",
            Uuid::new_v4(),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    parse_response_body(response).await
}

async fn get_json(app: &Router, uri: &str, user: Uuid) -> serde_json::Value {
    let response = app.clone().oneshot(get_request(uri, user)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    parse_response_body(response).await
}

// ============================================================================
// Rules
// ============================================================================

#[tokio::test]
async fn test_upsert_creates_then_replaces_by_name() {
    let app = create_test_app(Seed::new());

    let (status, created) = upsert(&app, rule("Low hit rate", "below", 50.0, "warning")).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["created"], true);
    assert_eq!(created["rule"]["comparison"], "below");
    assert_eq!(created["rule"]["timeWindowDays"], 7);
    assert_eq!(created["rule"]["checkFrequency"], "daily");
    assert_eq!(created["rule"]["appliesTo"], "all");

    let (status, replaced) = upsert(&app, rule("Low hit rate", "below", 45.0, "alert")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["created"], false);
    assert_eq!(replaced["rule"]["id"], created["rule"]["id"]);
    assert_eq!(replaced["rule"]["thresholdValue"], 45.0);

    let rules = get_json(&app, "/api/v1/alert-rules", Uuid::new_v4()).await;
    assert_eq!(rules.as_array().unwrap().len(), 1);
    assert_eq!(rules[0]["severity"], "alert");
}

#[tokio::test]
async fn test_upsert_rejects_invalid_rules() {
    let app = create_test_app(Seed::new());

    let (status, _) = upsert(&app, rule("Odd", "around", 50.0, "warning")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = upsert(&app, rule("Band", "between", 40.0, "warning")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("secondaryThreshold"));

    let mut bad_window = rule("Window", "below", 50.0, "warning");
    bad_window["timeWindowDays"] = json!(0);
    let (status, _) = upsert(&app, bad_window).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut no_players = rule("Nobody", "below", 50.0, "warning");
    no_players["appliesTo"] = json!("specific");
    let (status, _) = upsert(&app, no_players).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ============================================================================
// Evaluation
// ============================================================================

#[tokio::test]
async fn test_below_threshold_rule_raises_alert_and_updates_summary() {
    let seed = Seed::new();
    let player = seed.named_player("Jordan Miles");
    seed.set_metric(&player, HIT_RATE, 42.0);
    let app = create_test_app(seed);

    upsert(&app, rule("Low hit rate", "below", 50.0, "warning")).await;
    let report = run_checks(&app).await;

    assert_eq!(report["alertsGenerated"], 1);
    let alert = &report["alerts"][0];
    assert_eq!(alert["playerId"], player.id.to_string());
    assert_eq!(alert["severity"], "warning");
    assert_eq!(alert["currentValue"], 42.0);
    assert_eq!(alert["thresholdValue"], 50.0);
    assert_eq!(alert["acknowledged"], false);
    assert_eq!(alert["actionRequired"], false);
    let message = alert["message"].as_str().unwrap();
    assert!(message.contains("Jordan Miles"));
    assert!(message.contains("42.00"));

    let summary = get_json(&app, "/api/v1/alerts/summary", Uuid::new_v4()).await;
    assert!(summary["bySeverity"]["warning"].as_u64().unwrap() >= 1);
    assert_eq!(summary["unacknowledged"], 1);
    assert_eq!(summary["byType"]["performance_decline"], 1);
}

#[tokio::test]
async fn test_untriggered_and_missing_metrics_raise_nothing() {
    let seed = Seed::new();
    let strong = seed.player();
    seed.set_metric(&strong, HIT_RATE, 71.5);
    // No samples at all for this player.
    seed.player();
    let app = create_test_app(seed);

    upsert(&app, rule("Low hit rate", "below", 50.0, "warning")).await;
    let report = run_checks(&app).await;

    assert_eq!(report["alertsGenerated"], 0);
}

#[tokio::test]
async fn test_specific_players_rule_targets_only_them() {
    let seed = Seed::new();
    let targeted = seed.player();
    let other = seed.player();
    seed.set_metric(&targeted, HIT_RATE, 80.0);
    seed.set_metric(&other, HIT_RATE, 80.0);
    let app = create_test_app(seed);

    let mut body = rule("Hot streak", "above", 75.0, "info");
    body["appliesTo"] = json!("specific");
    body["specificPlayerIds"] = json!([targeted.id]);
    upsert(&app, body).await;

    let report = run_checks(&app).await;
    assert_eq!(report["alertsGenerated"], 1);
    assert_eq!(report["alerts"][0]["playerId"], targeted.id.to_string());
}

#[tokio::test]
async fn test_repeated_passes_duplicate_alerts() {
    let seed = Seed::new();
    let player = seed.player();
    seed.set_metric(&player, HIT_RATE, 30.0);
    let app = create_test_app(seed);

    upsert(&app, rule("Low hit rate", "below", 50.0, "warning")).await;
    run_checks(&app).await;
    run_checks(&app).await;

    let listed = get_json(&app, "/api/v1/alerts", Uuid::new_v4()).await;
    assert_eq!(listed["pagination"]["total"], 2);
}

#[tokio::test]
async fn test_critical_alert_also_sends_direct_message() {
    let seed = Seed::new();
    let player = seed.player();
    seed.set_metric(&player, HIT_RATE, 12.0);
    let app = create_test_app(seed);

    upsert(&app, rule("Slump", "below", 20.0, "critical")).await;
    let report = run_checks(&app).await;
    assert_eq!(report["alerts"][0]["actionRequired"], true);

    let messages = get_json(&app, "/api/v1/messages", player.id).await;
    let notices = messages["alerts"].as_array().unwrap();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0]["priority"], "urgent");
    assert_eq!(notices[0]["metadata"]["source"], "performance_alert");
    assert_eq!(notices[0]["metadata"]["alertId"], report["alerts"][0]["id"]);
    assert!(messages["direct"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_inactive_rules_are_skipped() {
    let seed = Seed::new();
    let player = seed.player();
    seed.set_metric(&player, HIT_RATE, 10.0);
    let app = create_test_app(seed);

    let mut body = rule("Paused", "below", 50.0, "warning");
    body["isActive"] = json!(false);
    upsert(&app, body).await;

    assert_eq!(run_checks(&app).await["alertsGenerated"], 0);
}

// ============================================================================
// Alerts
// ============================================================================

#[tokio::test]
async fn test_list_orders_and_filters_alerts() {
    let seed = Seed::new();
    let player = seed.player();
    seed.set_metric(&player, HIT_RATE, 10.0);
    let app = create_test_app(seed);

    upsert(&app, rule("Watch", "below", 50.0, "info")).await;
    upsert(&app, rule("Slump", "below", 20.0, "critical")).await;
    run_checks(&app).await;

    let listed = get_json(&app, "/api/v1/alerts", Uuid::new_v4()).await;
    let alerts = listed["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 2);
    assert_eq!(alerts[0]["severity"], "critical");
    assert_eq!(alerts[1]["severity"], "info");
    assert_eq!(
        listed["alertsByPlayer"][player.id.to_string()]
            .as_array()
            .unwrap()
            .len(),
        2
    );

    let critical = get_json(&app, "/api/v1/alerts?severity=critical", Uuid::new_v4()).await;
    assert_eq!(critical["alerts"].as_array().unwrap().len(), 1);

    let summary = get_json(&app, "/api/v1/alerts/summary", Uuid::new_v4()).await;
    assert_eq!(summary["recentCritical"].as_array().unwrap().len(), 1);
    let at_risk = summary["atRiskPlayers"].as_array().unwrap();
    assert_eq!(at_risk.len(), 1);
    assert_eq!(at_risk[0]["playerName"], player.name);
    assert_eq!(at_risk[0]["alertCount"], 2);
    assert_eq!(at_risk[0]["maxSeverity"], "critical");
}

#[tokio::test]
async fn test_acknowledge_is_idempotent() {
    let seed = Seed::new();
    let player = seed.player();
    seed.set_metric(&player, HIT_RATE, 10.0);
    let app = create_test_app(seed);

    upsert(&app, rule("Watch", "below", 50.0, "warning")).await;
    let report = run_checks(&app).await;
    let uri = format!(
        "/api/v1/alerts/{}/acknowledge",
        report["alerts"][0]["id"].as_str().unwrap()
    );

    let coach = Uuid::new_v4();
    let response = app
        .clone()
        .oneshot(request(Method::PATCH, &uri, coach))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first = parse_response_body(response).await;
    assert_eq!(first["acknowledged"], true);
    assert_eq!(first["acknowledgedBy"], coach.to_string());

    let response = app
        .clone()
        .oneshot(request(Method::PATCH, &uri, Uuid::new_v4()))
        .await
        .unwrap();
    let second = parse_response_body(response).await;
    assert_eq!(second["acknowledgedBy"], coach.to_string());
    assert_eq!(second["acknowledgedAt"], first["acknowledgedAt"]);

    let summary = get_json(&app, "/api/v1/alerts/summary", coach).await;
    assert_eq!(summary["unacknowledged"], 0);
    assert_eq!(summary["total"], 1);
}

#[tokio::test]
async fn test_acknowledge_unknown_alert_not_found() {
    let app = create_test_app(Seed::new());

    let response = app
        .oneshot(request(
            Method::PATCH,
            &format!("/api/v1/alerts/{}/acknowledge", Uuid::new_v4()),
            Uuid::new_v4(),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
