//! Core types and value objects for the coordination engine.
//!
//! Defines actions, their closed enumerations, and the request/patch/filter
//! shapes the store accepts.

use medic_core::{Severity, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ActionError;

/// Open key/value parameters carried by an action.
pub type Parameters = serde_json::Map<String, serde_json::Value>;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

// =============================================================================
// Enums
// =============================================================================

/// Kinds of remediation action the engine coordinates.
///
/// Closed set: adding a variant means extending the conflict rules in
/// [`ActionType::conflicts_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    NodeRemediation,
    ModelInference,
    AlertCorrelation,
    ResourceScaling,
}

impl ActionType {
    pub const ALL: [ActionType; 4] = [
        ActionType::NodeRemediation,
        ActionType::ModelInference,
        ActionType::AlertCorrelation,
        ActionType::ResourceScaling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::NodeRemediation => "node_remediation",
            ActionType::ModelInference => "model_inference",
            ActionType::AlertCorrelation => "alert_correlation",
            ActionType::ResourceScaling => "resource_scaling",
        }
    }

    /// True for the type pairs that may never run in the same batch.
    pub fn conflicts_with(&self, other: ActionType) -> bool {
        use ActionType::*;
        matches!(
            (*self, other),
            (NodeRemediation, ResourceScaling)
                | (ResourceScaling, NodeRemediation)
                | (ModelInference, AlertCorrelation)
                | (AlertCorrelation, ModelInference)
        )
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node_remediation" => Ok(ActionType::NodeRemediation),
            "model_inference" => Ok(ActionType::ModelInference),
            "alert_correlation" => Ok(ActionType::AlertCorrelation),
            "resource_scaling" => Ok(ActionType::ResourceScaling),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// Who proposed an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    Deterministic,
    AiDriven,
    Manual,
}

impl ActionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionSource::Deterministic => "deterministic",
            ActionSource::AiDriven => "ai_driven",
            ActionSource::Manual => "manual",
        }
    }
}

impl fmt::Display for ActionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionSource {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deterministic" => Ok(ActionSource::Deterministic),
            "ai_driven" => Ok(ActionSource::AiDriven),
            "manual" => Ok(ActionSource::Manual),
            _ => Err(format!("Unknown action source: {}", s)),
        }
    }
}

/// Action lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl ActionStatus {
    pub const ALL: [ActionStatus; 5] = [
        ActionStatus::Pending,
        ActionStatus::Running,
        ActionStatus::Completed,
        ActionStatus::Failed,
        ActionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Running => "running",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
            ActionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Completed | ActionStatus::Failed | ActionStatus::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ActionStatus::Pending | ActionStatus::Running)
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "running" => Ok(ActionStatus::Running),
            "completed" => Ok(ActionStatus::Completed),
            "failed" => Ok(ActionStatus::Failed),
            "cancelled" => Ok(ActionStatus::Cancelled),
            _ => Err(format!("Unknown action status: {}", s)),
        }
    }
}

/// Coarse status filter used by list views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusClass {
    Active,
    Completed,
    Failed,
    Cancelled,
    #[default]
    All,
}

impl StatusClass {
    pub fn matches(&self, status: ActionStatus) -> bool {
        match self {
            StatusClass::Active => status.is_active(),
            StatusClass::Completed => status == ActionStatus::Completed,
            StatusClass::Failed => status == ActionStatus::Failed,
            StatusClass::Cancelled => status == ActionStatus::Cancelled,
            StatusClass::All => true,
        }
    }
}

impl std::str::FromStr for StatusClass {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StatusClass::Active),
            "completed" => Ok(StatusClass::Completed),
            "failed" => Ok(StatusClass::Failed),
            "cancelled" => Ok(StatusClass::Cancelled),
            "all" => Ok(StatusClass::All),
            _ => Err(format!("Unknown status class: {}", s)),
        }
    }
}

// =============================================================================
// Structs
// =============================================================================

/// A proposed remediation, tracked through its lifecycle.
///
/// Timestamps are stamped by the engine only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub source: ActionSource,
    pub priority: u8,
    pub target: String,
    #[serde(default)]
    pub parameters: Parameters,
    pub status: ActionStatus,
    pub confidence: f64,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Submission order, assigned by the store.
    #[serde(skip)]
    pub sequence: u64,
}

impl Action {
    pub fn severity(&self) -> Severity {
        Severity::from_priority(self.priority)
    }

    /// Seconds between start and completion, or start and now while running.
    pub fn duration_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Timestamp::now);
        Some(started.seconds_until(end))
    }

    pub fn is_low_confidence_ai(&self, threshold: f64) -> bool {
        self.source == ActionSource::AiDriven && self.confidence < threshold
    }
}

/// Raw submission as received at the API boundary.
///
/// Enumerations arrive as strings so unknown values surface as
/// `InvalidRequest` rather than a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub action_type: String,
    pub source: String,
    pub priority: i64,
    pub target: String,
    #[serde(default)]
    pub parameters: Parameters,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl ActionRequest {
    pub fn new(
        action_type: ActionType,
        source: ActionSource,
        priority: u8,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            action_type: action_type.to_string(),
            source: source.to_string(),
            priority: priority as i64,
            target: target.into(),
            parameters: Parameters::new(),
            confidence: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Validate and build a pending action. Ids default to `action-<uuid>`.
    pub fn into_action(self) -> Result<Action, ActionError> {
        let action_type: ActionType = self
            .action_type
            .parse()
            .map_err(ActionError::InvalidRequest)?;
        let source: ActionSource = self.source.parse().map_err(ActionError::InvalidRequest)?;

        if !(MIN_PRIORITY as i64..=MAX_PRIORITY as i64).contains(&self.priority) {
            return Err(ActionError::InvalidRequest(format!(
                "priority must be between {} and {}, got {}",
                MIN_PRIORITY, MAX_PRIORITY, self.priority
            )));
        }

        let confidence = self.confidence.unwrap_or(1.0);
        if !(0.0..=1.0).contains(&confidence) {
            return Err(ActionError::InvalidRequest(format!(
                "confidence must be between 0 and 1, got {}",
                confidence
            )));
        }

        if self.target.trim().is_empty() {
            return Err(ActionError::InvalidRequest(
                "target must not be empty".to_string(),
            ));
        }

        let id = match self.id {
            Some(id) if id.trim().is_empty() => {
                return Err(ActionError::InvalidRequest("id must not be empty".to_string()))
            }
            Some(id) => id,
            None => format!("action-{}", uuid::Uuid::new_v4()),
        };

        Ok(Action {
            id,
            action_type,
            source,
            priority: self.priority as u8,
            target: self.target,
            parameters: self.parameters,
            status: ActionStatus::Pending,
            confidence,
            created_at: Timestamp::now(),
            started_at: None,
            completed_at: None,
            error_message: None,
            sequence: 0,
        })
    }
}

/// Partial update applied by `update`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionPatch {
    /// Merged key-wise into the existing parameters.
    #[serde(default)]
    pub parameters: Option<Parameters>,
    /// Manual transition; only `completed` or `cancelled` are accepted.
    #[serde(default)]
    pub status: Option<ActionStatus>,
    #[serde(default)]
    pub priority: Option<u8>,
}

/// List filter with offset/limit pagination.
#[derive(Debug, Clone, Default)]
pub struct ActionFilter {
    pub status_class: StatusClass,
    pub severity: Option<Severity>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl ActionFilter {
    pub fn matches(&self, action: &Action) -> bool {
        self.status_class.matches(action.status)
            && self.severity.map_or(true, |s| action.severity() == s)
    }
}

/// One page of a list call plus the unpaginated match count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPage {
    pub items: Vec<Action>,
    pub total: usize,
}

/// Counts by status plus queue length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub total: usize,
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub queue_length: usize,
}

impl StoreStats {
    pub fn active(&self) -> usize {
        self.pending + self.running
    }
}

/// What an executor reports on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub message: String,
    #[serde(default)]
    pub dry_run: bool,
}

impl ExecutionOutcome {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            dry_run: false,
        }
    }

    pub fn dry_run(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            dry_run: true,
        }
    }
}
