//! Incidents: `alert_correlation` actions opened on behalf of operators.
//!
//! This module turns incident requests into action requests and patches,
//! and renders actions as incident views. The coordinator applies them.

use medic_core::{Severity, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ActionError;
use crate::types::{
    Action, ActionPatch, ActionRequest, ActionSource, ActionStatus, ActionType, Parameters,
    StoreStats,
};

/// Target used when an incident names none.
pub const DEFAULT_INCIDENT_TARGET: &str = "cluster";
const DEFAULT_ACTOR: &str = "system";
const SLUG_LEN: usize = 20;
const DEFAULT_CORRELATION_SCORE: f64 = 0.8;

/// Priority an incident of the given severity is submitted with.
pub fn severity_priority(severity: Severity) -> Option<u8> {
    match severity {
        Severity::Critical => Some(10),
        Severity::High => Some(8),
        Severity::Medium => Some(5),
        Severity::Low => Some(2),
        Severity::Warning => None,
    }
}

fn parse_severity(raw: &str) -> Result<(Severity, u8), ActionError> {
    raw.parse::<Severity>()
        .ok()
        .and_then(|s| severity_priority(s).map(|p| (s, p)))
        .ok_or_else(|| {
            ActionError::InvalidRequest(format!(
                "severity must be one of critical, high, medium, low, got {}",
                raw
            ))
        })
}

fn required(field: &str, value: Option<String>) -> Result<String, ActionError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ActionError::InvalidRequest(format!(
            "Missing required field: {}",
            field
        ))),
    }
}

/// Lowercased, dash-separated prefix of a title for use in ids.
pub fn slugify(title: &str) -> String {
    title
        .chars()
        .take(SLUG_LEN)
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Short random suffix that keeps ids unique within one second.
pub(crate) fn short_suffix() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

// =============================================================================
// Create
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIncidentRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub labels: Option<Parameters>,
    #[serde(default)]
    pub affected_resources: Option<Vec<String>>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl CreateIncidentRequest {
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        severity: impl Into<String>,
    ) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(description.into()),
            severity: Some(severity.into()),
            ..Self::default()
        }
    }
}

/// Validated incident, ready to be submitted.
#[derive(Debug, Clone)]
pub struct NewIncident {
    pub request: ActionRequest,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub priority: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateIncidentResponse {
    pub incident_id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub priority: u8,
    pub status: String,
    pub created_at: Timestamp,
}

/// Validate a create request and build the action request for it.
///
/// The id is `incident-<unix>-<slug>-<suffix>`.
pub fn build_incident(req: CreateIncidentRequest, now: Timestamp) -> Result<NewIncident, ActionError> {
    let title = required("title", req.title)?;
    let description = required("description", req.description)?;
    let raw_severity = required("severity", req.severity)?;
    let (severity, priority) = parse_severity(&raw_severity)?;

    let source = match req.source.as_deref() {
        Some("manual") => ActionSource::Manual,
        _ => ActionSource::AiDriven,
    };
    let target = req
        .target
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_INCIDENT_TARGET.to_string());

    let id = format!(
        "incident-{}-{}-{}",
        now.unix_seconds(),
        slugify(&title),
        short_suffix()
    );

    let mut parameters = Parameters::new();
    parameters.insert("incident_type".into(), Value::from("user_created"));
    parameters.insert("title".into(), Value::from(title.clone()));
    parameters.insert("description".into(), Value::from(description.clone()));
    parameters.insert("severity".into(), Value::from(severity.as_str()));
    parameters.insert(
        "labels".into(),
        Value::Object(req.labels.unwrap_or_default()),
    );
    parameters.insert(
        "affected_resources".into(),
        Value::from(req.affected_resources.unwrap_or_default()),
    );
    parameters.insert("correlation_id".into(), Value::from(req.correlation_id));
    parameters.insert("external_id".into(), Value::from(req.external_id));
    parameters.insert(
        "created_by".into(),
        Value::from(req.created_by.unwrap_or_else(|| DEFAULT_ACTOR.to_string())),
    );

    let mut request = ActionRequest::new(ActionType::AlertCorrelation, source, priority, target)
        .with_id(id)
        .with_parameters(parameters);
    request.confidence = req.confidence;

    Ok(NewIncident {
        request,
        title,
        description,
        severity,
        priority,
    })
}

// =============================================================================
// Update
// =============================================================================

/// Incident status vocabulary. Only the closing statuses change the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentStatus {
    Open,
    Investigating,
    Resolved,
    Closed,
    Cancelled,
}

impl IncidentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IncidentStatus::Open => "open",
            IncidentStatus::Investigating => "investigating",
            IncidentStatus::Resolved => "resolved",
            IncidentStatus::Closed => "closed",
            IncidentStatus::Cancelled => "cancelled",
        }
    }

    /// Manual action transition this status requests, if any.
    pub fn action_status(&self) -> Option<ActionStatus> {
        match self {
            IncidentStatus::Resolved | IncidentStatus::Closed => Some(ActionStatus::Completed),
            IncidentStatus::Cancelled => Some(ActionStatus::Cancelled),
            IncidentStatus::Open | IncidentStatus::Investigating => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateIncidentRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub labels: Option<Parameters>,
    #[serde(default)]
    pub affected_resources: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<IncidentStatus>,
    #[serde(default)]
    pub updated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateIncidentResponse {
    pub incident_id: String,
    pub status: ActionStatus,
    pub priority: u8,
    pub parameters: Parameters,
    pub updated_at: Timestamp,
}

/// Build the patch for an incident update against its current record.
/// Labels merge key-wise with the existing ones.
pub fn incident_patch(
    current: &Action,
    req: UpdateIncidentRequest,
    now: Timestamp,
) -> Result<ActionPatch, ActionError> {
    let mut parameters = Parameters::new();
    let mut priority = None;

    if let Some(title) = req.title {
        parameters.insert("title".into(), Value::from(title));
    }
    if let Some(description) = req.description {
        parameters.insert("description".into(), Value::from(description));
    }
    if let Some(raw) = req.severity {
        let (severity, p) = parse_severity(&raw)?;
        parameters.insert("severity".into(), Value::from(severity.as_str()));
        priority = Some(p);
    }
    if let Some(labels) = req.labels {
        let mut merged = match current.parameters.get("labels") {
            Some(Value::Object(existing)) => existing.clone(),
            _ => Parameters::new(),
        };
        merged.extend(labels);
        parameters.insert("labels".into(), Value::Object(merged));
    }
    if let Some(resources) = req.affected_resources {
        parameters.insert("affected_resources".into(), Value::from(resources));
    }
    if let Some(status) = req.status {
        parameters.insert("incident_status".into(), Value::from(status.as_str()));
    }
    parameters.insert("updated_at".into(), Value::from(now.to_rfc3339()));
    parameters.insert(
        "updated_by".into(),
        Value::from(req.updated_by.unwrap_or_else(|| DEFAULT_ACTOR.to_string())),
    );

    Ok(ActionPatch {
        parameters: Some(parameters),
        status: req.status.and_then(|s| s.action_status()),
        priority,
    })
}

// =============================================================================
// Cancel
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelIncidentRequest {
    #[serde(default)]
    pub cancelled_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelIncidentResponse {
    pub incident_id: String,
    pub status: ActionStatus,
    pub cancelled_at: Timestamp,
}

pub fn cancel_patch(req: CancelIncidentRequest, now: Timestamp) -> ActionPatch {
    let mut parameters = Parameters::new();
    parameters.insert("cancelled_at".into(), Value::from(now.to_rfc3339()));
    parameters.insert(
        "cancelled_by".into(),
        Value::from(req.cancelled_by.unwrap_or_else(|| DEFAULT_ACTOR.to_string())),
    );
    ActionPatch {
        parameters: Some(parameters),
        status: Some(ActionStatus::Cancelled),
        priority: None,
    }
}

// =============================================================================
// Correlate
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationType {
    #[default]
    Related,
    Duplicate,
    RootCause,
    Symptom,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelateRequest {
    #[serde(default, rename = "type")]
    pub correlation_type: Option<CorrelationType>,
    #[serde(default)]
    pub related_incidents: Vec<String>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub correlated_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    #[serde(rename = "type")]
    pub correlation_type: CorrelationType,
    pub related_incidents: Vec<String>,
    pub score: f64,
    pub created_at: String,
    pub created_by: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelateResponse {
    pub incident_id: String,
    pub correlation: Correlation,
    pub total_correlations: usize,
}

/// Append a correlation to the incident's list.
///
/// Returns the new correlation, the patch carrying the full list and the
/// list's new length.
pub fn correlation_patch(
    current: &Action,
    req: CorrelateRequest,
    now: Timestamp,
) -> Result<(Correlation, ActionPatch, usize), ActionError> {
    let score = req.score.unwrap_or(DEFAULT_CORRELATION_SCORE);
    if !(0.0..=1.0).contains(&score) {
        return Err(ActionError::InvalidRequest(format!(
            "score must be between 0 and 1, got {}",
            score
        )));
    }

    let correlation = Correlation {
        correlation_type: req.correlation_type.unwrap_or_default(),
        related_incidents: req.related_incidents,
        score,
        created_at: now.to_rfc3339(),
        created_by: req
            .correlated_by
            .unwrap_or_else(|| DEFAULT_ACTOR.to_string()),
    };

    let mut correlations = match current.parameters.get("correlations") {
        Some(Value::Array(existing)) => existing.clone(),
        _ => Vec::new(),
    };
    let value = serde_json::to_value(&correlation)
        .map_err(|e| ActionError::Storage(format!("Failed to encode correlation: {}", e)))?;
    correlations.push(value);
    let total = correlations.len();

    let mut parameters = Parameters::new();
    parameters.insert("correlations".into(), Value::Array(correlations));

    Ok((
        correlation,
        ActionPatch {
            parameters: Some(parameters),
            ..ActionPatch::default()
        },
        total,
    ))
}

// =============================================================================
// Views
// =============================================================================

/// An action rendered as an incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentView {
    pub id: String,
    pub title: String,
    pub description: String,
    pub severity: Severity,
    pub status: ActionStatus,
    pub priority: u8,
    pub target: String,
    pub action_type: ActionType,
    pub source: ActionSource,
    pub confidence: f64,
    pub parameters: Parameters,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub duration_seconds: Option<f64>,
    pub tags: Vec<String>,
}

fn title_case(raw: &str) -> String {
    raw.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl From<&Action> for IncidentView {
    fn from(action: &Action) -> Self {
        let severity = action.severity();
        let text = |key: &str| {
            action
                .parameters
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        let title = text("title").unwrap_or_else(|| {
            format!("{} - {}", title_case(action.action_type.as_str()), action.target)
        });
        let description = text("description")
            .unwrap_or_else(|| format!("Automated {} on {}", action.action_type, action.target));
        let duration_seconds = match (action.started_at, action.completed_at) {
            (Some(_), Some(_)) => action.duration_seconds(),
            _ => None,
        };

        Self {
            id: action.id.clone(),
            title,
            description,
            severity,
            status: action.status,
            priority: action.priority,
            target: action.target.clone(),
            action_type: action.action_type,
            source: action.source,
            confidence: action.confidence,
            parameters: action.parameters.clone(),
            created_at: action.created_at,
            started_at: action.started_at,
            completed_at: action.completed_at,
            duration_seconds,
            tags: vec![
                action.action_type.to_string(),
                action.source.to_string(),
                severity.to_string(),
                format!("priority_{}", action.priority),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub active_incidents: usize,
    pub completed_incidents: usize,
    pub failed_incidents: usize,
    pub total_incidents: usize,
}

impl From<StoreStats> for IncidentSummary {
    fn from(stats: StoreStats) -> Self {
        Self {
            active_incidents: stats.active(),
            completed_incidents: stats.completed,
            failed_incidents: stats.failed,
            total_incidents: stats.total,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentList {
    pub incidents: Vec<IncidentView>,
    pub total: usize,
    pub offset: usize,
    pub limit: Option<usize>,
    pub summary: IncidentSummary,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn incident_action(params: serde_json::Value) -> Action {
        ActionRequest::new(ActionType::AlertCorrelation, ActionSource::Manual, 5, "cluster")
            .with_id("incident-1")
            .with_parameters(serde_json::from_value(params).unwrap())
            .into_action()
            .unwrap()
    }

    #[test]
    fn test_severity_priority_map() {
        assert_eq!(severity_priority(Severity::Critical), Some(10));
        assert_eq!(severity_priority(Severity::High), Some(8));
        assert_eq!(severity_priority(Severity::Medium), Some(5));
        assert_eq!(severity_priority(Severity::Low), Some(2));
        assert_eq!(severity_priority(Severity::Warning), None);
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Disk Pressure"), "disk-pressure");
        assert_eq!(slugify("API latency spike on checkout"), "api-latency-spike-on");
        assert_eq!(slugify("a/b"), "a-b");
    }

    #[test]
    fn test_build_incident() {
        let mut req = CreateIncidentRequest::new("Disk Pressure", "Node disk above 90%", "high");
        req.source = Some("manual".to_string());
        req.affected_resources = Some(vec!["node-2".to_string()]);

        let now = Timestamp::now();
        let incident = build_incident(req, now).unwrap();
        assert_eq!(incident.priority, 8);
        assert_eq!(incident.severity, Severity::High);

        let action = incident.request.into_action().unwrap();
        assert!(action
            .id
            .starts_with(&format!("incident-{}-disk-pressure-", now.unix_seconds())));
        assert_eq!(action.action_type, ActionType::AlertCorrelation);
        assert_eq!(action.source, ActionSource::Manual);
        assert_eq!(action.target, "cluster");
        assert_eq!(action.parameters["incident_type"], "user_created");
        assert_eq!(action.parameters["created_by"], "system");
        assert_eq!(action.parameters["affected_resources"], serde_json::json!(["node-2"]));
        assert!(action.parameters["correlation_id"].is_null());
    }

    #[test]
    fn test_build_incident_defaults_to_ai_driven() {
        let req = CreateIncidentRequest::new("t", "d", "low");
        let incident = build_incident(req, Timestamp::now()).unwrap();
        assert_eq!(incident.request.source, "ai_driven");
        assert_eq!(incident.priority, 2);
    }

    #[test]
    fn test_build_incident_missing_fields() {
        let mut req = CreateIncidentRequest::new("t", "d", "low");
        req.description = None;
        let err = build_incident(req, Timestamp::now()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid request: Missing required field: description"
        );
    }

    #[test]
    fn test_build_incident_rejects_unknown_severity() {
        for severity in ["warning", "urgent"] {
            let req = CreateIncidentRequest::new("t", "d", severity);
            assert!(matches!(
                build_incident(req, Timestamp::now()),
                Err(ActionError::InvalidRequest(_))
            ));
        }
    }

    #[test]
    fn test_incident_ids_are_unique_within_a_second() {
        let now = Timestamp::now();
        let a = build_incident(CreateIncidentRequest::new("same", "d", "low"), now).unwrap();
        let b = build_incident(CreateIncidentRequest::new("same", "d", "low"), now).unwrap();
        assert_ne!(a.request.id, b.request.id);
    }

    #[test]
    fn test_incident_patch_merges_labels_and_reprioritises() {
        let current = incident_action(serde_json::json!({"labels": {"team": "storage", "env": "dev"}}));
        let mut labels = Parameters::new();
        labels.insert("env".into(), Value::from("prod"));
        let req = UpdateIncidentRequest {
            severity: Some("critical".to_string()),
            labels: Some(labels),
            updated_by: Some("oncall".to_string()),
            ..UpdateIncidentRequest::default()
        };

        let patch = incident_patch(&current, req, Timestamp::now()).unwrap();
        let params = patch.parameters.unwrap();
        assert_eq!(params["labels"], serde_json::json!({"team": "storage", "env": "prod"}));
        assert_eq!(params["severity"], "critical");
        assert_eq!(params["updated_by"], "oncall");
        assert!(params.contains_key("updated_at"));
        assert_eq!(patch.priority, Some(10));
        assert!(patch.status.is_none());
    }

    #[test]
    fn test_incident_status_mapping() {
        let current = incident_action(serde_json::json!({}));
        let cases = [
            (IncidentStatus::Open, None),
            (IncidentStatus::Investigating, None),
            (IncidentStatus::Resolved, Some(ActionStatus::Completed)),
            (IncidentStatus::Closed, Some(ActionStatus::Completed)),
            (IncidentStatus::Cancelled, Some(ActionStatus::Cancelled)),
        ];
        for (status, expected) in cases {
            let req = UpdateIncidentRequest {
                status: Some(status),
                ..UpdateIncidentRequest::default()
            };
            let patch = incident_patch(&current, req, Timestamp::now()).unwrap();
            assert_eq!(patch.status, expected);
            assert_eq!(
                patch.parameters.unwrap()["incident_status"],
                status.as_str()
            );
        }
    }

    #[test]
    fn test_update_request_uses_camel_case() {
        let req: UpdateIncidentRequest = serde_json::from_value(serde_json::json!({
            "affectedResources": ["pod-a"],
            "updatedBy": "alice",
            "status": "investigating"
        }))
        .unwrap();
        assert_eq!(req.affected_resources.unwrap(), vec!["pod-a".to_string()]);
        assert_eq!(req.updated_by.as_deref(), Some("alice"));
        assert_eq!(req.status, Some(IncidentStatus::Investigating));
    }

    #[test]
    fn test_correlation_appends() {
        let current = incident_action(serde_json::json!({
            "correlations": [{"type": "duplicate", "related_incidents": ["x"], "score": 1.0,
                              "created_at": "2024-01-01T00:00:00+00:00", "created_by": "system"}]
        }));
        let req: CorrelateRequest = serde_json::from_value(serde_json::json!({
            "type": "root_cause",
            "relatedIncidents": ["incident-2"],
            "correlatedBy": "ai"
        }))
        .unwrap();

        let (correlation, patch, total) =
            correlation_patch(&current, req, Timestamp::now()).unwrap();
        assert_eq!(total, 2);
        assert_eq!(correlation.correlation_type, CorrelationType::RootCause);
        assert_eq!(correlation.score, 0.8);
        assert_eq!(correlation.created_by, "ai");
        let list = patch.parameters.unwrap()["correlations"].clone();
        assert_eq!(list.as_array().unwrap().len(), 2);
        assert_eq!(list[1]["type"], "root_cause");
    }

    #[test]
    fn test_correlation_defaults_and_score_range() {
        let current = incident_action(serde_json::json!({}));
        let (correlation, _, total) =
            correlation_patch(&current, CorrelateRequest::default(), Timestamp::now()).unwrap();
        assert_eq!(correlation.correlation_type, CorrelationType::Related);
        assert_eq!(correlation.created_by, "system");
        assert_eq!(total, 1);

        let req = CorrelateRequest {
            score: Some(1.5),
            ..CorrelateRequest::default()
        };
        assert!(correlation_patch(&current, req, Timestamp::now()).is_err());
    }

    #[test]
    fn test_cancel_patch() {
        let patch = cancel_patch(CancelIncidentRequest::default(), Timestamp::now());
        assert_eq!(patch.status, Some(ActionStatus::Cancelled));
        let params = patch.parameters.unwrap();
        assert_eq!(params["cancelled_by"], "system");
        assert!(params.contains_key("cancelled_at"));
    }

    #[test]
    fn test_view_of_plain_action() {
        let action = ActionRequest::new(
            ActionType::NodeRemediation,
            ActionSource::Deterministic,
            9,
            "node1",
        )
        .into_action()
        .unwrap();
        let view = IncidentView::from(&action);
        assert_eq!(view.title, "Node Remediation - node1");
        assert_eq!(view.description, "Automated node_remediation on node1");
        assert_eq!(view.severity, Severity::Critical);
        assert_eq!(
            view.tags,
            vec!["node_remediation", "deterministic", "critical", "priority_9"]
        );
        assert!(view.duration_seconds.is_none());
    }

    #[test]
    fn test_view_of_incident_uses_parameters() {
        let view = IncidentView::from(&incident_action(serde_json::json!({
            "title": "Disk Pressure",
            "description": "Node disk above 90%"
        })));
        assert_eq!(view.title, "Disk Pressure");
        assert_eq!(view.description, "Node disk above 90%");
    }
}
