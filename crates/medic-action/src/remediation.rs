//! Remediation trigger: turns an incident-scoped remediation request into
//! an `ai_driven` action with enriched parameters.

use std::fmt;
use std::str::FromStr;

use medic_core::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ActionError;
use crate::incident::short_suffix;
use crate::types::{Action, ActionRequest, ActionSource, ActionType, Parameters};

const DEFAULT_PRIORITY: i64 = 8;
const DEFAULT_CONFIDENCE: f64 = 0.9;
const TRIGGERED_BY: &str = "remediation_api";

/// Remediation vocabulary accepted by the trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationKind {
    ScaleDeployment,
    ScaleUp,
    ScaleDown,
    RestartPod,
    RemediateNode,
    ClearAlerts,
    CorrelateAlerts,
    RunInference,
}

impl RemediationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RemediationKind::ScaleDeployment => "scale_deployment",
            RemediationKind::ScaleUp => "scale_up",
            RemediationKind::ScaleDown => "scale_down",
            RemediationKind::RestartPod => "restart_pod",
            RemediationKind::RemediateNode => "remediate_node",
            RemediationKind::ClearAlerts => "clear_alerts",
            RemediationKind::CorrelateAlerts => "correlate_alerts",
            RemediationKind::RunInference => "run_inference",
        }
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            RemediationKind::ScaleDeployment
            | RemediationKind::ScaleUp
            | RemediationKind::ScaleDown => ActionType::ResourceScaling,
            RemediationKind::RestartPod | RemediationKind::RemediateNode => {
                ActionType::NodeRemediation
            }
            RemediationKind::ClearAlerts | RemediationKind::CorrelateAlerts => {
                ActionType::AlertCorrelation
            }
            RemediationKind::RunInference => ActionType::ModelInference,
        }
    }
}

impl fmt::Display for RemediationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RemediationKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scale_deployment" => Ok(RemediationKind::ScaleDeployment),
            "scale_up" => Ok(RemediationKind::ScaleUp),
            "scale_down" => Ok(RemediationKind::ScaleDown),
            "restart_pod" => Ok(RemediationKind::RestartPod),
            "remediate_node" => Ok(RemediationKind::RemediateNode),
            "clear_alerts" => Ok(RemediationKind::ClearAlerts),
            "correlate_alerts" => Ok(RemediationKind::CorrelateAlerts),
            "run_inference" => Ok(RemediationKind::RunInference),
            _ => Err(format!("Unsupported remediation action: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemediationRequest {
    #[serde(default)]
    pub incident_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub priority: Option<i64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub dry_run: bool,
}

impl RemediationRequest {
    pub fn new(incident_id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            incident_id: Some(incident_id.into()),
            action: Some(action.into()),
            ..Self::default()
        }
    }
}

/// Validated remediation, ready to be submitted unless it is a dry run.
#[derive(Debug, Clone)]
pub struct PreparedRemediation {
    pub kind: RemediationKind,
    pub incident_id: String,
    pub action: Action,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemediationResponse {
    pub action_id: String,
    pub incident_id: String,
    pub action: RemediationKind,
    pub mapped_type: ActionType,
    pub status: String,
    pub dry_run: bool,
    pub description: String,
    pub priority: u8,
    pub confidence: f64,
    pub target: String,
    pub source: ActionSource,
    pub parameters: Parameters,
    pub timestamp: Timestamp,
}

impl RemediationResponse {
    pub fn new(prepared: &PreparedRemediation) -> Self {
        let action = &prepared.action;
        let (status, description) = if prepared.dry_run {
            (
                "dry_run",
                format!("DRY RUN: would trigger {} for incident {}", prepared.kind, prepared.incident_id),
            )
        } else {
            (
                "submitted",
                format!("Triggered {} for incident {}", prepared.kind, prepared.incident_id),
            )
        };
        Self {
            action_id: action.id.clone(),
            incident_id: prepared.incident_id.clone(),
            action: prepared.kind,
            mapped_type: action.action_type,
            status: status.to_string(),
            dry_run: prepared.dry_run,
            description,
            priority: action.priority,
            confidence: action.confidence,
            target: action.target.clone(),
            source: action.source,
            parameters: action.parameters.clone(),
            timestamp: Timestamp::now(),
        }
    }
}

/// Caller value for a family default: camelCase key, then snake_case key,
/// then the default.
fn pick(params: &Parameters, camel: &str, snake: &str, default: Value) -> Value {
    params
        .get(camel)
        .or_else(|| params.get(snake))
        .cloned()
        .unwrap_or(default)
}

/// The caller's keys, then the common keys, then the family defaults.
///
/// Common keys always win, so a caller cannot flip `dry_run` or
/// `triggered_by` through the parameter map.
pub fn enrich_parameters(
    kind: RemediationKind,
    incident_id: &str,
    dry_run: bool,
    caller: &Parameters,
) -> Parameters {
    let mut params = caller.clone();
    params.remove("dryRun");
    params.insert("action".into(), Value::from(kind.as_str()));
    params.insert("incident_id".into(), Value::from(incident_id));
    params.insert("triggered_by".into(), Value::from(TRIGGERED_BY));
    params.insert("dry_run".into(), Value::from(dry_run));

    let family: Vec<(&str, Value)> = match kind.action_type() {
        ActionType::ResourceScaling => vec![
            ("scaling_type", Value::from(kind.as_str())),
            ("min_replicas", pick(caller, "minReplicas", "min_replicas", Value::from(1))),
            ("max_replicas", pick(caller, "maxReplicas", "max_replicas", Value::from(10))),
            ("target_replicas", pick(caller, "targetReplicas", "target_replicas", Value::Null)),
            ("cpu_threshold", pick(caller, "cpuThreshold", "cpu_threshold", Value::from(80))),
            (
                "memory_threshold",
                pick(caller, "memoryThreshold", "memory_threshold", Value::from(80)),
            ),
        ],
        ActionType::NodeRemediation => vec![
            (
                "restart_strategy",
                pick(caller, "restartStrategy", "restart_strategy", Value::from("rolling")),
            ),
            ("grace_period", pick(caller, "gracePeriod", "grace_period", Value::from(30))),
            ("force_restart", pick(caller, "forceRestart", "force_restart", Value::from(false))),
        ],
        ActionType::AlertCorrelation => vec![
            (
                "alert_labels",
                pick(caller, "alertLabels", "alert_labels", Value::Object(Parameters::new())),
            ),
            (
                "silence_duration",
                pick(caller, "silenceDuration", "silence_duration", Value::from("1h")),
            ),
            (
                "correlation_window",
                pick(caller, "correlationWindow", "correlation_window", Value::from("5m")),
            ),
        ],
        ActionType::ModelInference => Vec::new(),
    };
    for (key, value) in family {
        params.insert(key.to_string(), value);
    }
    params
}

/// Validate a trigger request and build its action.
///
/// The id is `remediation-<incident>-<action>-<unix>-<suffix>`.
pub fn prepare_remediation(
    req: RemediationRequest,
    now: Timestamp,
) -> Result<PreparedRemediation, ActionError> {
    let (incident_id, raw_action) = match (req.incident_id, req.action) {
        (Some(i), Some(a)) if !i.trim().is_empty() && !a.trim().is_empty() => (i, a),
        _ => {
            return Err(ActionError::InvalidRequest(
                "Missing incidentId or action".to_string(),
            ))
        }
    };
    let kind: RemediationKind = raw_action.parse().map_err(ActionError::InvalidRequest)?;

    let parameters = enrich_parameters(kind, &incident_id, req.dry_run, &req.parameters);
    let id = format!(
        "remediation-{}-{}-{}-{}",
        incident_id,
        kind,
        now.unix_seconds(),
        short_suffix()
    );

    let mut request = ActionRequest::new(
        kind.action_type(),
        ActionSource::AiDriven,
        1,
        incident_id.clone(),
    )
    .with_id(id)
    .with_parameters(parameters)
    .with_confidence(req.confidence.unwrap_or(DEFAULT_CONFIDENCE));
    request.priority = req.priority.unwrap_or(DEFAULT_PRIORITY);

    Ok(PreparedRemediation {
        kind,
        incident_id,
        action: request.into_action()?,
        dry_run: req.dry_run,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_mapping() {
        let cases = [
            ("scale_deployment", ActionType::ResourceScaling),
            ("scale_up", ActionType::ResourceScaling),
            ("scale_down", ActionType::ResourceScaling),
            ("restart_pod", ActionType::NodeRemediation),
            ("remediate_node", ActionType::NodeRemediation),
            ("clear_alerts", ActionType::AlertCorrelation),
            ("correlate_alerts", ActionType::AlertCorrelation),
            ("run_inference", ActionType::ModelInference),
        ];
        for (raw, expected) in cases {
            let kind: RemediationKind = raw.parse().unwrap();
            assert_eq!(kind.action_type(), expected);
            assert_eq!(kind.to_string(), raw);
        }
        assert!("reboot_cluster".parse::<RemediationKind>().is_err());
    }

    #[test]
    fn test_prepare_scaling_with_camel_case_params() {
        let mut req = RemediationRequest::new("incident-42", "scale_up");
        req.parameters = serde_json::from_value(serde_json::json!({
            "minReplicas": 2,
            "maxReplicas": 6,
            "targetReplicas": 4,
            "deployment": "checkout"
        }))
        .unwrap();

        let now = Timestamp::now();
        let prepared = prepare_remediation(req, now).unwrap();
        let action = &prepared.action;
        assert!(action
            .id
            .starts_with(&format!("remediation-incident-42-scale_up-{}-", now.unix_seconds())));
        assert_eq!(action.action_type, ActionType::ResourceScaling);
        assert_eq!(action.source, ActionSource::AiDriven);
        assert_eq!(action.target, "incident-42");
        assert_eq!(action.priority, 8);
        assert_eq!(action.confidence, 0.9);

        let p = &action.parameters;
        assert_eq!(p["action"], "scale_up");
        assert_eq!(p["incident_id"], "incident-42");
        assert_eq!(p["triggered_by"], "remediation_api");
        assert_eq!(p["dry_run"], false);
        assert_eq!(p["scaling_type"], "scale_up");
        assert_eq!(p["min_replicas"], 2);
        assert_eq!(p["max_replicas"], 6);
        assert_eq!(p["target_replicas"], 4);
        assert_eq!(p["cpu_threshold"], 80);
        assert_eq!(p["deployment"], "checkout");
    }

    #[test]
    fn test_restart_defaults() {
        let prepared =
            prepare_remediation(RemediationRequest::new("inc", "restart_pod"), Timestamp::now())
                .unwrap();
        let p = &prepared.action.parameters;
        assert_eq!(p["restart_strategy"], "rolling");
        assert_eq!(p["grace_period"], 30);
        assert_eq!(p["force_restart"], false);
        assert!(!p.contains_key("min_replicas"));
    }

    #[test]
    fn test_alert_defaults() {
        let prepared =
            prepare_remediation(RemediationRequest::new("inc", "clear_alerts"), Timestamp::now())
                .unwrap();
        let p = &prepared.action.parameters;
        assert_eq!(p["alert_labels"], serde_json::json!({}));
        assert_eq!(p["silence_duration"], "1h");
        assert_eq!(p["correlation_window"], "5m");
    }

    #[test]
    fn test_missing_fields_rejected() {
        let req = RemediationRequest {
            action: Some("scale_up".to_string()),
            ..RemediationRequest::default()
        };
        let err = prepare_remediation(req, Timestamp::now()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request: Missing incidentId or action");
    }

    #[test]
    fn test_unknown_action_rejected() {
        let err = prepare_remediation(RemediationRequest::new("inc", "nuke"), Timestamp::now())
            .unwrap_err();
        assert!(err.to_string().contains("Unsupported remediation action: nuke"));
    }

    #[test]
    fn test_priority_out_of_range_rejected() {
        let mut req = RemediationRequest::new("inc", "run_inference");
        req.priority = Some(11);
        assert!(matches!(
            prepare_remediation(req, Timestamp::now()),
            Err(ActionError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_request_uses_camel_case() {
        let req: RemediationRequest = serde_json::from_value(serde_json::json!({
            "incidentId": "inc-1",
            "action": "remediate_node",
            "dryRun": true,
            "priority": 6
        }))
        .unwrap();
        let prepared = prepare_remediation(req, Timestamp::now()).unwrap();
        assert!(prepared.dry_run);
        assert_eq!(prepared.action.priority, 6);
        assert_eq!(prepared.action.parameters["dry_run"], true);

        let response = RemediationResponse::new(&prepared);
        assert_eq!(response.status, "dry_run");
        assert_eq!(response.mapped_type, ActionType::NodeRemediation);
        assert!(response.description.starts_with("DRY RUN"));
    }

    #[test]
    fn test_caller_parameters_cannot_override_common_keys() {
        let mut req = RemediationRequest::new("incident-7", "restart_pod");
        req.parameters = serde_json::from_value(serde_json::json!({
            "dry_run": true,
            "dryRun": true,
            "triggered_by": "someone-else",
            "incident_id": "incident-other",
            "namespace": "payments"
        }))
        .unwrap();

        let prepared = prepare_remediation(req, Timestamp::now()).unwrap();
        assert!(!prepared.dry_run);
        let p = &prepared.action.parameters;
        assert_eq!(p["dry_run"], false);
        assert!(p.get("dryRun").is_none());
        assert_eq!(p["triggered_by"], "remediation_api");
        assert_eq!(p["incident_id"], "incident-7");
        assert_eq!(p["namespace"], "payments");
        assert_eq!(RemediationResponse::new(&prepared).status, "submitted");
    }
}
