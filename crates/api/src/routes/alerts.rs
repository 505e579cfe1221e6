//! Performance alert endpoint handlers.

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::CurrentUser;
use domain::models::performance_alert::{
    AlertFilter, AlertSummary, ListAlertsQuery, ListAlertsResponse, PerformanceAlert,
};

/// List alerts, newest unacknowledged and most severe first.
///
/// GET /api/v1/alerts?playerId&alertType&severity&acknowledged&since&until&limit&offset
pub async fn list_alerts(
    State(state): State<AppState>,
    _user: CurrentUser,
    query: Result<Query<ListAlertsQuery>, QueryRejection>,
) -> Result<Json<ListAlertsResponse>, ApiError> {
    let Query(query) = query?;
    let filter = AlertFilter::from(query);
    let response = state.alerts.list_alerts(&filter).await?;
    Ok(Json(response))
}

/// Dashboard aggregates over all alerts.
///
/// GET /api/v1/alerts/summary
pub async fn alert_summary(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> Result<Json<AlertSummary>, ApiError> {
    let summary = state.alerts.summary().await?;
    Ok(Json(summary))
}

/// Acknowledge an alert. Acknowledging twice keeps the first acknowledgement.
///
/// PATCH /api/v1/alerts/:id/acknowledge
pub async fn acknowledge_alert(
    State(state): State<AppState>,
    user: CurrentUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<PerformanceAlert>, ApiError> {
    let Path(alert_id) = id?;
    let alert = state.alerts.acknowledge(alert_id, user.id()).await?;
    Ok(Json(alert))
}
