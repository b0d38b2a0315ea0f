//! Coordination facade.
//!
//! Owns the store, the scheduler and the anomaly ensemble and exposes the
//! operations any transport wraps: submit/get/list/update/cancel, analysis,
//! incidents, remediation and the observer views.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use medic_anomaly::{AnalysisReport, AnalyzeRequest, AnomalyEnsemble};
use medic_core::{MedicConfig, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::conflict::ConflictResolver;
use crate::error::ActionError;
use crate::events::EngineEvent;
use crate::executor::ExecutorRegistry;
use crate::incident::{
    build_incident, cancel_patch, correlation_patch, incident_patch, CancelIncidentRequest,
    CancelIncidentResponse, CorrelateRequest, CorrelateResponse, CreateIncidentRequest,
    CreateIncidentResponse, IncidentList, IncidentSummary, IncidentView, UpdateIncidentRequest,
    UpdateIncidentResponse,
};
use crate::metrics::EngineMetrics;
use crate::remediation::{prepare_remediation, RemediationRequest, RemediationResponse};
use crate::scheduler::Scheduler;
use crate::store::ActionStore;
use crate::types::{
    Action, ActionFilter, ActionPage, ActionPatch, ActionRequest, ActionStatus, ActionType,
    StoreStats,
};

/// Assumed run time of an action when estimating its completion.
const ESTIMATED_RUN_SECS: i64 = 300;
const RELATED_LIMIT: usize = 5;
const QUEUE_PREVIEW_LIMIT: usize = 10;

// =============================================================================
// Responses
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub id: String,
    pub status: ActionStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub id: String,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub status: ActionStatus,
    pub relationship: String,
}

/// An action plus derived timing and same-target neighbours.
#[derive(Debug, Clone, Serialize)]
pub struct ActionStatusView {
    #[serde(flatten)]
    pub action: Action,
    pub duration_seconds: Option<f64>,
    pub estimated_completion: Option<Timestamp>,
    pub related_actions: Vec<RelatedAction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub priority: u8,
    pub target: String,
    pub created_at: Timestamp,
    pub estimated_start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunningAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub priority: u8,
    pub target: String,
    pub started_at: Option<Timestamp>,
    pub duration_seconds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatistics {
    pub total_submitted: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowQueue {
    pub queue_length: usize,
    pub processing_status: String,
    pub queued_actions: Vec<QueuedAction>,
    pub running_actions: Vec<RunningAction>,
    pub statistics: QueueStatistics,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        *self == HealthStatus::Healthy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSummary {
    pub status: HealthStatus,
    pub active_actions: usize,
    pub pending_actions: usize,
    pub total_actions: usize,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineCounters {
    pub conflicts_detected: u64,
    pub actions_processed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub coordination_engine: EngineSummary,
    pub metrics: EngineCounters,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub scheduler_running: bool,
    pub queue_length: usize,
    pub max_queue_length: usize,
    pub active_actions: usize,
    pub uptime_seconds: u64,
    pub statistics: StoreStats,
    pub timestamp: Timestamp,
}

// =============================================================================
// Coordinator
// =============================================================================

pub struct Coordinator {
    config: MedicConfig,
    store: Arc<ActionStore>,
    scheduler: Arc<Scheduler>,
    ensemble: AnomalyEnsemble,
    started: Instant,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Build an engine with the built-in executors and detectors.
    pub fn new(config: MedicConfig) -> Result<Self, ActionError> {
        let registry = ExecutorRegistry::with_defaults(&config.executor);
        Self::with_registry(config, registry)
    }

    /// Build an engine with a caller-supplied executor registry.
    pub fn with_registry(
        config: MedicConfig,
        registry: ExecutorRegistry,
    ) -> Result<Self, ActionError> {
        let metrics = Arc::new(EngineMetrics::new()?);
        let store = Arc::new(ActionStore::new(metrics));
        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&store),
            ConflictResolver::from_config(&config.conflict),
            Arc::new(registry),
            config.scheduler.clone(),
        ));
        let ensemble = AnomalyEnsemble::with_defaults(&config.anomaly);

        Ok(Self {
            config,
            store,
            scheduler,
            ensemble,
            started: Instant::now(),
            loop_handle: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MedicConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<ActionStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the scheduler loop. Returns `false` if it was already running.
    pub fn start_scheduler(&self) -> Result<bool, ActionError> {
        let Some(handle) = self.scheduler.start() else {
            return Ok(false);
        };
        let mut slot = self
            .loop_handle
            .lock()
            .map_err(|e| ActionError::Storage(format!("Lock poisoned: {}", e)))?;
        *slot = Some(handle);
        Ok(true)
    }

    /// Stop the scheduler loop and wait for the current tick to finish.
    pub async fn stop_scheduler(&self) -> Result<(), ActionError> {
        let handle = self
            .loop_handle
            .lock()
            .map_err(|e| ActionError::Storage(format!("Lock poisoned: {}", e)))?
            .take();
        if let Some(handle) = handle {
            self.scheduler.shutdown();
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Scheduler task ended abnormally");
            }
        }
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.store.subscribe()
    }

    pub fn metrics_text(&self) -> Result<String, ActionError> {
        Ok(self.store.metrics().export()?)
    }

    // =========================================================================
    // Actions
    // =========================================================================

    pub fn submit(&self, request: ActionRequest) -> Result<SubmitResponse, ActionError> {
        let action = request.into_action()?;
        let id = self.store.submit(action)?;
        Ok(SubmitResponse {
            id,
            status: ActionStatus::Pending,
        })
    }

    pub fn get(&self, id: &str) -> Result<Action, ActionError> {
        self.store.get(id)
    }

    pub fn list(&self, filter: &ActionFilter) -> Result<ActionPage, ActionError> {
        self.store.list(filter)
    }

    pub fn update(&self, id: &str, patch: ActionPatch) -> Result<Action, ActionError> {
        self.store.update(id, patch)
    }

    /// Cancel a non-terminal action.
    pub fn cancel(&self, id: &str) -> Result<CancelResponse, ActionError> {
        let action = self.store.cancel(id)?;
        Ok(CancelResponse {
            id: action.id,
            cancelled: true,
        })
    }

    // =========================================================================
    // Analysis and remediation
    // =========================================================================

    pub fn analyze(&self, request: &AnalyzeRequest) -> AnalysisReport {
        self.ensemble.analyze(request)
    }

    /// Submit a remediation for an incident. Dry runs are validated and
    /// echoed without touching the queue.
    pub fn trigger_remediation(
        &self,
        request: RemediationRequest,
    ) -> Result<RemediationResponse, ActionError> {
        let prepared = prepare_remediation(request, Timestamp::now())?;
        if prepared.dry_run {
            tracing::info!(
                action_id = %prepared.action.id,
                incident_id = %prepared.incident_id,
                remediation = %prepared.kind,
                "Remediation dry run"
            );
        } else {
            self.store.submit(prepared.action.clone())?;
        }
        Ok(RemediationResponse::new(&prepared))
    }

    // =========================================================================
    // Incidents
    // =========================================================================

    pub fn create_incident(
        &self,
        request: CreateIncidentRequest,
    ) -> Result<CreateIncidentResponse, ActionError> {
        let now = Timestamp::now();
        let incident = build_incident(request, now)?;
        let id = self.store.submit(incident.request.into_action()?)?;
        Ok(CreateIncidentResponse {
            incident_id: id,
            title: incident.title,
            description: incident.description,
            severity: incident.severity,
            priority: incident.priority,
            status: "created".to_string(),
            created_at: now,
        })
    }

    pub fn update_incident(
        &self,
        id: &str,
        request: UpdateIncidentRequest,
    ) -> Result<UpdateIncidentResponse, ActionError> {
        let now = Timestamp::now();
        let (updated, ()) = self
            .store
            .modify(id, |current| Ok((incident_patch(current, request, now)?, ())))?;
        Ok(UpdateIncidentResponse {
            incident_id: updated.id,
            status: updated.status,
            priority: updated.priority,
            parameters: updated.parameters,
            updated_at: now,
        })
    }

    pub fn list_incidents(&self, filter: &ActionFilter) -> Result<IncidentList, ActionError> {
        let page = self.store.list(filter)?;
        let summary = IncidentSummary::from(self.store.stats()?);
        Ok(IncidentList {
            incidents: page.items.iter().map(IncidentView::from).collect(),
            total: page.total,
            offset: filter.offset,
            limit: filter.limit,
            summary,
        })
    }

    pub fn correlate_incident(
        &self,
        id: &str,
        request: CorrelateRequest,
    ) -> Result<CorrelateResponse, ActionError> {
        let (_, (correlation, total)) = self.store.modify(id, |current| {
            let (correlation, patch, total) =
                correlation_patch(current, request, Timestamp::now())?;
            Ok((patch, (correlation, total)))
        })?;
        tracing::info!(
            incident_id = %id,
            correlation_type = ?correlation.correlation_type,
            total,
            "Incident correlated"
        );
        Ok(CorrelateResponse {
            incident_id: id.to_string(),
            correlation,
            total_correlations: total,
        })
    }

    pub fn cancel_incident(
        &self,
        id: &str,
        request: CancelIncidentRequest,
    ) -> Result<CancelIncidentResponse, ActionError> {
        let now = Timestamp::now();
        let cancelled = self.store.update(id, cancel_patch(request, now))?;
        Ok(CancelIncidentResponse {
            incident_id: cancelled.id,
            status: cancelled.status,
            cancelled_at: now,
        })
    }

    // =========================================================================
    // Observer views
    // =========================================================================

    pub fn action_status(&self, id: &str) -> Result<ActionStatusView, ActionError> {
        let action = self.store.get(id)?;
        let related_actions = self
            .store
            .related(id, RELATED_LIMIT)?
            .into_iter()
            .map(|a| RelatedAction {
                id: a.id,
                action_type: a.action_type,
                status: a.status,
                relationship: "same_target".to_string(),
            })
            .collect();
        let estimated_completion = match (action.status, action.started_at) {
            (ActionStatus::Running, Some(started)) => Some(started.plus_seconds(ESTIMATED_RUN_SECS)),
            _ => None,
        };

        Ok(ActionStatusView {
            duration_seconds: action.duration_seconds(),
            estimated_completion,
            related_actions,
            action,
        })
    }

    pub fn workflow_queue(&self) -> Result<WorkflowQueue, ActionError> {
        let stats = self.store.stats()?;
        let registry = self.scheduler.registry();
        let queued_actions = self
            .store
            .queued(QUEUE_PREVIEW_LIMIT)?
            .into_iter()
            .enumerate()
            .map(|(i, a)| QueuedAction {
                description: registry.describe(&a),
                id: a.id,
                action_type: a.action_type,
                priority: a.priority,
                target: a.target,
                created_at: a.created_at,
                estimated_start: if i == 0 { "next" } else { "queued" }.to_string(),
            })
            .collect();
        let running_actions = self
            .store
            .running()?
            .into_iter()
            .map(|a| RunningAction {
                description: registry.describe(&a),
                duration_seconds: a.duration_seconds().unwrap_or_default(),
                id: a.id,
                action_type: a.action_type,
                priority: a.priority,
                target: a.target,
                started_at: a.started_at,
            })
            .collect();

        Ok(WorkflowQueue {
            queue_length: stats.queue_length,
            processing_status: if self.scheduler.is_running() { "active" } else { "stopped" }
                .to_string(),
            queued_actions,
            running_actions,
            statistics: QueueStatistics {
                total_submitted: stats.total,
                completed: stats.completed,
                failed: stats.failed,
                cancelled: stats.cancelled,
            },
            timestamp: Timestamp::now(),
        })
    }

    pub fn cluster_status(&self) -> Result<ClusterStatus, ActionError> {
        let stats = self.store.stats()?;
        let metrics = self.store.metrics();
        Ok(ClusterStatus {
            coordination_engine: EngineSummary {
                status: if self.scheduler.is_running() {
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Unhealthy
                },
                active_actions: stats.running,
                pending_actions: stats.pending,
                total_actions: stats.total,
                uptime_seconds: self.uptime_seconds(),
            },
            metrics: EngineCounters {
                conflicts_detected: metrics.conflicts_detected(),
                actions_processed: metrics.actions_submitted(),
            },
            timestamp: Timestamp::now(),
        })
    }

    /// Unhealthy when the loop is stopped or the queue has reached its ceiling.
    pub fn health(&self) -> Result<HealthReport, ActionError> {
        let stats = self.store.stats()?;
        let max_queue_length = self.config.health.max_queue_length;
        let scheduler_running = self.scheduler.is_running();
        let status = if scheduler_running && stats.queue_length < max_queue_length {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        Ok(HealthReport {
            status,
            scheduler_running,
            queue_length: stats.queue_length,
            max_queue_length,
            active_actions: stats.running,
            uptime_seconds: self.uptime_seconds(),
            statistics: stats,
            timestamp: Timestamp::now(),
        })
    }
}
