//! Action state machine with validated transitions.
//!
//! Scheduler-driven lifecycle:
//! Pending -> Running -> Completed/Failed
//! Pending -> Cancelled (conflict lost)
//!
//! Manual close/cancel flows may move any non-terminal action to
//! Completed or Cancelled. Nothing leaves a terminal state.

use crate::error::ActionError;
use crate::types::ActionStatus;

/// Validate a transition performed by the scheduler or conflict resolution.
///
/// Valid transitions:
/// - Pending -> Running
/// - Pending -> Cancelled
/// - Running -> Completed
/// - Running -> Failed
pub fn validate_transition(from: ActionStatus, to: ActionStatus) -> Result<(), ActionError> {
    let valid = matches!(
        (from, to),
        (ActionStatus::Pending, ActionStatus::Running)
            | (ActionStatus::Pending, ActionStatus::Cancelled)
            | (ActionStatus::Running, ActionStatus::Completed)
            | (ActionStatus::Running, ActionStatus::Failed)
    );

    if valid {
        Ok(())
    } else {
        Err(ActionError::InvalidTransition { from, to })
    }
}

/// Validate a transition requested through `update`/`cancel`.
///
/// The scheduler stays the only writer of `running` and `failed`.
pub fn validate_manual_transition(from: ActionStatus, to: ActionStatus) -> Result<(), ActionError> {
    let valid = !from.is_terminal()
        && matches!(to, ActionStatus::Completed | ActionStatus::Cancelled);

    if valid {
        Ok(())
    } else {
        Err(ActionError::InvalidTransition { from, to })
    }
}
