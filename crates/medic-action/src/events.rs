//! Lifecycle events broadcast to observers (SSE clients, logs).

use serde::{Deserialize, Serialize};

use crate::types::{ActionSource, ActionType};

/// Capacity of the in-process event channel. Slow subscribers lag and
/// skip events rather than block the engine.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ActionSubmitted {
        action_id: String,
        action_type: ActionType,
        source: ActionSource,
        priority: u8,
        target: String,
    },
    ActionStarted {
        action_id: String,
    },
    ActionCompleted {
        action_id: String,
        duration_seconds: Option<f64>,
    },
    ActionFailed {
        action_id: String,
        error: String,
    },
    ActionCancelled {
        action_id: String,
        reason: String,
    },
    ConflictResolved {
        winner: String,
        loser: String,
        conflict_type: String,
        rule: String,
    },
    EngineStarted,
    EngineStopped,
}

impl EngineEvent {
    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::ActionSubmitted { .. } => "action_submitted",
            EngineEvent::ActionStarted { .. } => "action_started",
            EngineEvent::ActionCompleted { .. } => "action_completed",
            EngineEvent::ActionFailed { .. } => "action_failed",
            EngineEvent::ActionCancelled { .. } => "action_cancelled",
            EngineEvent::ConflictResolved { .. } => "conflict_resolved",
            EngineEvent::EngineStarted => "engine_started",
            EngineEvent::EngineStopped => "engine_stopped",
        }
    }
}
