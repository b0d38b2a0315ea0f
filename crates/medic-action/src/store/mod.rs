//! Action storage and lifecycle management.
//!
//! The store owns every `Action` record and the ordered queue of pending
//! ids. All mutations happen under one write lock, so queue membership and
//! status always change together.

pub mod state_machine;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use medic_core::Timestamp;
use tokio::sync::broadcast;

use crate::error::ActionError;
use crate::events::{EngineEvent, EVENT_CHANNEL_CAPACITY};
use crate::metrics::EngineMetrics;
use crate::store::state_machine::{validate_manual_transition, validate_transition};
use crate::types::{
    Action, ActionFilter, ActionPage, ActionPatch, ActionStatus, StoreStats, MAX_PRIORITY,
    MIN_PRIORITY,
};

#[derive(Default)]
struct StoreInner {
    actions: HashMap<String, Action>,
    /// Every id in submission order.
    order: Vec<String>,
    /// Ids whose status is `pending`, oldest first.
    queue: VecDeque<String>,
    next_sequence: u64,
    running: usize,
}

impl StoreInner {
    fn dequeue(&mut self, id: &str) {
        self.queue.retain(|queued| queued != id);
    }

    fn status_of(&self, id: &str) -> Result<ActionStatus, ActionError> {
        self.actions
            .get(id)
            .map(|a| a.status)
            .ok_or_else(|| ActionError::NotFound(id.to_string()))
    }
}

/// In-memory action store. Records are never evicted.
pub struct ActionStore {
    inner: RwLock<StoreInner>,
    metrics: Arc<EngineMetrics>,
    events: broadcast::Sender<EngineEvent>,
}

impl ActionStore {
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: RwLock::new(StoreInner::default()),
            metrics,
            events,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, StoreInner>, ActionError> {
        self.inner
            .read()
            .map_err(|e| ActionError::Storage(format!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, StoreInner>, ActionError> {
        self.inner
            .write()
            .map_err(|e| ActionError::Storage(format!("Lock poisoned: {}", e)))
    }

    pub fn metrics(&self) -> &Arc<EngineMetrics> {
        &self.metrics
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Broadcast an event. Having no subscribers is not an error.
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Insert a new action as `pending` and append it to the queue.
    ///
    /// Status, timestamps and sequence are reset here whatever the caller set.
    pub fn submit(&self, mut action: Action) -> Result<String, ActionError> {
        let mut inner = self.write()?;
        if inner.actions.contains_key(&action.id) {
            return Err(ActionError::DuplicateId(action.id));
        }

        action.status = ActionStatus::Pending;
        action.created_at = Timestamp::now();
        action.started_at = None;
        action.completed_at = None;
        action.error_message = None;
        action.sequence = inner.next_sequence;
        inner.next_sequence += 1;

        let id = action.id.clone();
        let event = EngineEvent::ActionSubmitted {
            action_id: id.clone(),
            action_type: action.action_type,
            source: action.source,
            priority: action.priority,
            target: action.target.clone(),
        };

        self.metrics
            .record_submitted(action.action_type, action.source);
        tracing::info!(
            action_id = %id,
            action_type = %action.action_type,
            source = %action.source,
            priority = action.priority,
            target = %action.target,
            "Action submitted"
        );

        inner.order.push(id.clone());
        inner.queue.push_back(id.clone());
        inner.actions.insert(id.clone(), action);
        drop(inner);

        self.publish(event);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Result<Action, ActionError> {
        let inner = self.read()?;
        inner
            .actions
            .get(id)
            .cloned()
            .ok_or_else(|| ActionError::NotFound(id.to_string()))
    }

    /// List actions in submission order.
    pub fn list(&self, filter: &ActionFilter) -> Result<ActionPage, ActionError> {
        let inner = self.read()?;
        let matching: Vec<&Action> = inner
            .order
            .iter()
            .filter_map(|id| inner.actions.get(id))
            .filter(|a| filter.matches(a))
            .collect();

        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        Ok(ActionPage { items, total })
    }

    /// Merge parameters, change priority, and optionally close or cancel.
    ///
    /// Validation happens before anything is written, so a rejected patch
    /// leaves the action untouched.
    pub fn update(&self, id: &str, patch: ActionPatch) -> Result<Action, ActionError> {
        let inner = self.write()?;
        self.apply_patch(inner, id, patch)
    }

    /// Read-modify-write under a single write lock.
    ///
    /// `build` sees the current record and returns the patch to apply plus
    /// any value the caller wants back. Concurrent callers on the same id
    /// are serialized, so patches built from the record never overwrite
    /// each other.
    pub fn modify<T>(
        &self,
        id: &str,
        build: impl FnOnce(&Action) -> Result<(ActionPatch, T), ActionError>,
    ) -> Result<(Action, T), ActionError> {
        let inner = self.write()?;
        let current = inner
            .actions
            .get(id)
            .ok_or_else(|| ActionError::NotFound(id.to_string()))?;
        let (patch, extra) = build(current)?;
        let updated = self.apply_patch(inner, id, patch)?;
        Ok((updated, extra))
    }

    fn apply_patch(
        &self,
        mut inner: RwLockWriteGuard<'_, StoreInner>,
        id: &str,
        patch: ActionPatch,
    ) -> Result<Action, ActionError> {
        if let Some(p) = patch.priority {
            if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&p) {
                return Err(ActionError::InvalidRequest(format!(
                    "priority must be between {} and {}, got {}",
                    MIN_PRIORITY, MAX_PRIORITY, p
                )));
            }
        }

        let from = inner.status_of(id)?;
        if let Some(to) = patch.status {
            validate_manual_transition(from, to)?;
        }

        let action = inner
            .actions
            .get_mut(id)
            .ok_or_else(|| ActionError::NotFound(id.to_string()))?;

        if let Some(params) = patch.parameters {
            for (key, value) in params {
                action.parameters.insert(key, value);
            }
        }
        if let Some(p) = patch.priority {
            action.priority = p;
        }

        let mut event = None;
        if let Some(to) = patch.status {
            action.status = to;
            action.completed_at = Some(Timestamp::now());
            event = Some(match to {
                ActionStatus::Cancelled => EngineEvent::ActionCancelled {
                    action_id: id.to_string(),
                    reason: "cancelled manually".to_string(),
                },
                _ => EngineEvent::ActionCompleted {
                    action_id: id.to_string(),
                    duration_seconds: action.duration_seconds(),
                },
            });
        }
        let updated = action.clone();

        if patch.status.is_some() {
            inner.dequeue(id);
            if from == ActionStatus::Running {
                inner.running = inner.running.saturating_sub(1);
                self.metrics.set_active(inner.running);
            }
            tracing::info!(
                action_id = %id,
                from = %from,
                to = %updated.status,
                "Action closed manually"
            );
        }
        drop(inner);

        if let Some(event) = event {
            self.publish(event);
        }
        Ok(updated)
    }

    /// Cancel a non-terminal action. Pending actions leave the queue at once.
    pub fn cancel(&self, id: &str) -> Result<Action, ActionError> {
        self.update(
            id,
            ActionPatch {
                status: Some(ActionStatus::Cancelled),
                ..ActionPatch::default()
            },
        )
    }

    /// Remove an id from the queue. No-op if absent.
    pub fn remove_from_queue(&self, id: &str) -> Result<(), ActionError> {
        self.write()?.dequeue(id);
        Ok(())
    }

    /// Queued actions that are still `pending`, in queue order.
    pub fn pending_snapshot(&self) -> Result<Vec<Action>, ActionError> {
        self.queued(usize::MAX)
    }

    /// The first `limit` queued actions that are still `pending`.
    pub fn queued(&self, limit: usize) -> Result<Vec<Action>, ActionError> {
        let inner = self.read()?;
        Ok(inner
            .queue
            .iter()
            .filter_map(|id| inner.actions.get(id))
            .filter(|a| a.status == ActionStatus::Pending)
            .take(limit)
            .cloned()
            .collect())
    }

    pub fn running(&self) -> Result<Vec<Action>, ActionError> {
        let inner = self.read()?;
        Ok(inner
            .order
            .iter()
            .filter_map(|id| inner.actions.get(id))
            .filter(|a| a.status == ActionStatus::Running)
            .cloned()
            .collect())
    }

    /// Other actions with the same target, in submission order.
    pub fn related(&self, id: &str, limit: usize) -> Result<Vec<Action>, ActionError> {
        let inner = self.read()?;
        let target = inner
            .actions
            .get(id)
            .map(|a| a.target.clone())
            .ok_or_else(|| ActionError::NotFound(id.to_string()))?;
        Ok(inner
            .order
            .iter()
            .filter(|other| other.as_str() != id)
            .filter_map(|other| inner.actions.get(other))
            .filter(|a| a.target == target)
            .take(limit)
            .cloned()
            .collect())
    }

    /// Cancel the loser of a conflict. Returns `false` when the action is
    /// no longer pending (closed manually since the snapshot).
    pub fn cancel_for_conflict(&self, loser: &str, winner: &str) -> Result<bool, ActionError> {
        let mut inner = self.write()?;
        let from = inner.status_of(loser)?;
        if from != ActionStatus::Pending {
            inner.dequeue(loser);
            return Ok(false);
        }
        validate_transition(from, ActionStatus::Cancelled)?;

        let reason = format!("superseded by {}", winner);
        if let Some(action) = inner.actions.get_mut(loser) {
            action.status = ActionStatus::Cancelled;
            action.completed_at = Some(Timestamp::now());
            action.error_message = Some(reason.clone());
        }
        inner.dequeue(loser);
        drop(inner);

        tracing::info!(action_id = %loser, winner = %winner, "Action cancelled by conflict");
        self.publish(EngineEvent::ActionCancelled {
            action_id: loser.to_string(),
            reason,
        });
        Ok(true)
    }

    /// Move a pending action to `running`. Returns `None` when the action
    /// is no longer pending.
    pub fn start(&self, id: &str) -> Result<Option<Action>, ActionError> {
        let mut inner = self.write()?;
        let from = inner.status_of(id)?;
        if from != ActionStatus::Pending {
            inner.dequeue(id);
            return Ok(None);
        }
        validate_transition(from, ActionStatus::Running)?;

        let action = inner
            .actions
            .get_mut(id)
            .ok_or_else(|| ActionError::NotFound(id.to_string()))?;
        action.status = ActionStatus::Running;
        action.started_at = Some(Timestamp::now());
        let started = action.clone();

        inner.dequeue(id);
        inner.running += 1;
        self.metrics.set_active(inner.running);
        drop(inner);

        tracing::info!(action_id = %id, action_type = %started.action_type, "Action started");
        self.publish(EngineEvent::ActionStarted {
            action_id: id.to_string(),
        });
        Ok(Some(started))
    }

    pub fn complete(&self, id: &str) -> Result<Action, ActionError> {
        self.finish(id, ActionStatus::Completed, None)
    }

    pub fn fail(&self, id: &str, message: impl Into<String>) -> Result<Action, ActionError> {
        self.finish(id, ActionStatus::Failed, Some(message.into()))
    }

    fn finish(
        &self,
        id: &str,
        to: ActionStatus,
        error: Option<String>,
    ) -> Result<Action, ActionError> {
        let mut inner = self.write()?;
        let from = inner.status_of(id)?;
        if from != ActionStatus::Running {
            tracing::warn!(
                action_id = %id,
                status = %from,
                "Action closed while its executor was in flight; keeping {}",
                from
            );
            return inner
                .actions
                .get(id)
                .cloned()
                .ok_or_else(|| ActionError::NotFound(id.to_string()));
        }
        validate_transition(from, to)?;

        let action = inner
            .actions
            .get_mut(id)
            .ok_or_else(|| ActionError::NotFound(id.to_string()))?;
        action.status = to;
        action.completed_at = Some(Timestamp::now());
        action.error_message = error.clone();
        let finished = action.clone();

        inner.running = inner.running.saturating_sub(1);
        self.metrics.set_active(inner.running);
        drop(inner);

        let event = match error {
            Some(error) => {
                tracing::warn!(action_id = %id, error = %error, "Action failed");
                EngineEvent::ActionFailed {
                    action_id: id.to_string(),
                    error,
                }
            }
            None => {
                tracing::info!(
                    action_id = %id,
                    duration_seconds = finished.duration_seconds().unwrap_or_default(),
                    "Action completed"
                );
                EngineEvent::ActionCompleted {
                    action_id: id.to_string(),
                    duration_seconds: finished.duration_seconds(),
                }
            }
        };
        self.publish(event);
        Ok(finished)
    }

    pub fn queue_len(&self) -> Result<usize, ActionError> {
        Ok(self.read()?.queue.len())
    }

    pub fn is_queued(&self, id: &str) -> Result<bool, ActionError> {
        Ok(self.read()?.queue.iter().any(|q| q == id))
    }

    pub fn stats(&self) -> Result<StoreStats, ActionError> {
        let inner = self.read()?;
        let mut stats = StoreStats {
            total: inner.actions.len(),
            queue_length: inner.queue.len(),
            ..StoreStats::default()
        };
        for action in inner.actions.values() {
            match action.status {
                ActionStatus::Pending => stats.pending += 1,
                ActionStatus::Running => stats.running += 1,
                ActionStatus::Completed => stats.completed += 1,
                ActionStatus::Failed => stats.failed += 1,
                ActionStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }
}
