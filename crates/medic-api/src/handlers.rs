//! Route handler functions for all API endpoints.
//!
//! Each handler extracts query/path parameters and bodies via axum
//! extractors, calls into the coordinator and returns JSON responses.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use medic_action::coordinator::{
    ActionStatusView, CancelResponse, ClusterStatus, SubmitResponse, WorkflowQueue,
};
use medic_action::incident::{
    CancelIncidentRequest, CancelIncidentResponse, CorrelateRequest, CorrelateResponse,
    CreateIncidentRequest, CreateIncidentResponse, IncidentList, UpdateIncidentRequest,
    UpdateIncidentResponse,
};
use medic_action::remediation::{RemediationRequest, RemediationResponse};
use medic_action::{Action, ActionFilter, ActionPage, ActionPatch, ActionRequest, StatusClass};
use medic_anomaly::{AnalysisReport, AnalyzeRequest};
use medic_core::Severity;

use crate::error::ApiError;
use crate::state::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

// =============================================================================
// Query parameter types
// =============================================================================

/// Filters shared by the action and incident list endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// One of active, completed, failed, cancelled, all.
    pub status: Option<String>,
    pub severity: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ListParams {
    fn into_filter(self) -> Result<ActionFilter, ApiError> {
        let status_class = match self.status.as_deref() {
            Some(s) => s.parse::<StatusClass>().map_err(ApiError::BadRequest)?,
            None => StatusClass::All,
        };
        let severity = self
            .severity
            .as_deref()
            .map(str::parse::<Severity>)
            .transpose()
            .map_err(ApiError::BadRequest)?;
        Ok(ActionFilter {
            status_class,
            severity,
            offset: self.offset.unwrap_or(0),
            limit: self.limit,
        })
    }
}

// =============================================================================
// Operational endpoints
// =============================================================================

/// GET /health - 200 when healthy, 503 with the same body otherwise.
pub async fn health(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let report = state.coordinator.health()?;
    let status = if report.status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(report)))
}

/// GET /metrics - Prometheus text exposition.
pub async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let body = state.coordinator.metrics_text()?;
    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body))
}

/// GET /stream - SSE stream of engine lifecycle events.
pub async fn stream(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send> {
    let rx = state.coordinator.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().event(event.name()).data(data)))
        }
        // Lagged receivers skip what they missed.
        Err(_) => None,
    });

    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

// =============================================================================
// Actions
// =============================================================================

/// POST /actions - submit an action.
pub async fn submit_action(
    State(state): State<AppState>,
    payload: Result<Json<ActionRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.coordinator.submit(request)?))
}

/// GET /actions - list actions with optional filters.
pub async fn list_actions(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<ActionPage>, ApiError> {
    let Query(params) = params?;
    let filter = params.into_filter()?;
    Ok(Json(state.coordinator.list(&filter)?))
}

/// GET /actions/{id}
pub async fn get_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Action>, ApiError> {
    Ok(Json(state.coordinator.get(&id)?))
}

/// PUT /actions/{id} - merge parameters, change priority or close manually.
pub async fn update_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ActionPatch>, JsonRejection>,
) -> Result<Json<Action>, ApiError> {
    let Json(patch) = payload?;
    Ok(Json(state.coordinator.update(&id, patch)?))
}

/// DELETE /actions/{id} - cancel a non-terminal action.
pub async fn cancel_action(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    Ok(Json(state.coordinator.cancel(&id)?))
}

/// GET /api/v1/actions/{id}/status - status with timing and related actions.
pub async fn action_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ActionStatusView>, ApiError> {
    Ok(Json(state.coordinator.action_status(&id)?))
}

// =============================================================================
// Incidents
// =============================================================================

/// GET /api/v1/incidents
pub async fn list_incidents(
    State(state): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<IncidentList>, ApiError> {
    let Query(params) = params?;
    let filter = params.into_filter()?;
    Ok(Json(state.coordinator.list_incidents(&filter)?))
}

/// POST /api/v1/incidents - open an incident, tracked as an alert correlation action.
pub async fn create_incident(
    State(state): State<AppState>,
    payload: Result<Json<CreateIncidentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateIncidentResponse>), ApiError> {
    let Json(request) = payload?;
    let created = state.coordinator.create_incident(request)?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/v1/incidents/{id}
pub async fn update_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateIncidentRequest>, JsonRejection>,
) -> Result<Json<UpdateIncidentResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.coordinator.update_incident(&id, request)?))
}

/// DELETE /api/v1/incidents/{id} - the body is optional.
pub async fn cancel_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Option<Json<CancelIncidentRequest>>,
) -> Result<Json<CancelIncidentResponse>, ApiError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    Ok(Json(state.coordinator.cancel_incident(&id, request)?))
}

/// POST /api/v1/incidents/{id}/correlate
pub async fn correlate_incident(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<CorrelateRequest>, JsonRejection>,
) -> Result<Json<CorrelateResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.coordinator.correlate_incident(&id, request)?))
}

// =============================================================================
// Analysis and remediation
// =============================================================================

/// POST /api/v1/anomalies/analyze
pub async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisReport>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.coordinator.analyze(&request)))
}

/// POST /api/v1/remediation/trigger
pub async fn trigger_remediation(
    State(state): State<AppState>,
    payload: Result<Json<RemediationRequest>, JsonRejection>,
) -> Result<Json<RemediationResponse>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.coordinator.trigger_remediation(request)?))
}

// =============================================================================
// Observer views
// =============================================================================

/// GET /api/v1/cluster/status
pub async fn cluster_status(
    State(state): State<AppState>,
) -> Result<Json<ClusterStatus>, ApiError> {
    Ok(Json(state.coordinator.cluster_status()?))
}

/// GET /api/v1/workflows/queue
pub async fn workflow_queue(
    State(state): State<AppState>,
) -> Result<Json<WorkflowQueue>, ApiError> {
    Ok(Json(state.coordinator.workflow_queue()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_defaults() {
        let filter = ListParams::default().into_filter().unwrap();
        assert_eq!(filter.status_class, StatusClass::All);
        assert!(filter.severity.is_none());
        assert_eq!(filter.offset, 0);
        assert!(filter.limit.is_none());
    }

    #[test]
    fn test_list_params_parse() {
        let params = ListParams {
            status: Some("active".to_string()),
            severity: Some("high".to_string()),
            limit: Some(5),
            offset: Some(10),
        };
        let filter = params.into_filter().unwrap();
        assert_eq!(filter.status_class, StatusClass::Active);
        assert_eq!(filter.severity, Some(Severity::High));
        assert_eq!(filter.limit, Some(5));
        assert_eq!(filter.offset, 10);
    }

    #[test]
    fn test_list_params_reject_unknown_values() {
        let params = ListParams {
            status: Some("sleeping".to_string()),
            ..ListParams::default()
        };
        assert!(matches!(params.into_filter(), Err(ApiError::BadRequest(_))));

        let params = ListParams {
            severity: Some("catastrophic".to_string()),
            ..ListParams::default()
        };
        assert!(matches!(params.into_filter(), Err(ApiError::BadRequest(_))));
    }
}
