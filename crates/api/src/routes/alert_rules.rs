//! Alert rule endpoint handlers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;
use domain::models::alert_rule::{
    AlertRuleResponse, UpsertAlertRuleRequest, UpsertAlertRuleResponse,
};
use domain::services::EvaluationReport;

/// Create a rule, or replace the rule with the same name.
///
/// POST /api/v1/alert-rules
///
/// Responds 201 when a rule was created and 200 when one was replaced.
pub async fn upsert_rule(
    State(state): State<AppState>,
    _user: CurrentUser,
    payload: Result<Json<UpsertAlertRuleRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UpsertAlertRuleResponse>), ApiError> {
    let Json(request) = payload?;
    let response = state.alerts.upsert_rule(request).await?;
    let status = if response.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(response)))
}

/// GET /api/v1/alert-rules
pub async fn list_rules(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<Vec<AlertRuleResponse>>, ApiError> {
    Ok(Json(state.alerts.list_rules().await?))
}

/// Run one evaluation pass over every active rule.
///
/// POST /api/v1/alert-rules/run-checks
pub async fn run_checks(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<EvaluationReport>, ApiError> {
    tracing::info!(requested_by = %user.id(), "Manual alert check requested");
    let report = state.engine.run_checks().await?;
    Ok(Json(report))
}
