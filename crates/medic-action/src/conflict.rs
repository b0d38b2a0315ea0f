//! Conflict detection and resolution over a pending batch.
//!
//! Two actions conflict when they share a target or their types form an
//! incompatible pair. Resolution is pairwise and greedy: pairs are visited
//! in detection order and the loser of each pair leaves the working set.
//! The outcome can depend on that order; it is not a global optimum.

use std::fmt;

use medic_core::config::ConflictConfig;
use serde::{Deserialize, Serialize};

use crate::types::{Action, ActionSource};

/// Why two actions conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    SameTarget,
    IncompatibleTypes,
}

impl ConflictKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictKind::SameTarget => "same_target",
            ConflictKind::IncompatibleTypes => "incompatible_types",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The rule that decided a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    /// Same target, exactly one side deterministic.
    SameTarget,
    /// Exactly one side is AI-driven below the confidence threshold.
    LowConfidence,
    /// Priorities differ.
    Priority,
    /// Tie: earlier submission wins.
    SubmissionOrder,
}

impl ResolutionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionRule::SameTarget => "same_target",
            ResolutionRule::LowConfidence => "low_confidence",
            ResolutionRule::Priority => "priority",
            ResolutionRule::SubmissionOrder => "submission_order",
        }
    }
}

impl fmt::Display for ResolutionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conflicting pair, as indices into the batch (`first < second`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    pub first: usize,
    pub second: usize,
    pub kind: ConflictKind,
}

/// An action removed from the batch by losing a conflict.
#[derive(Debug, Clone)]
pub struct Cancellation {
    pub loser: Action,
    pub winner_id: String,
    pub kind: ConflictKind,
    pub rule: ResolutionRule,
}

/// Result of resolving a batch.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Survivors, in batch order.
    pub kept: Vec<Action>,
    /// Losers, in the order they were eliminated.
    pub cancelled: Vec<Cancellation>,
}

#[derive(Debug, Clone)]
pub struct ConflictResolver {
    confidence_threshold: f64,
}

impl ConflictResolver {
    pub fn new(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
        }
    }

    pub fn from_config(config: &ConflictConfig) -> Self {
        Self::new(config.confidence_threshold)
    }

    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }

    /// Why `a` and `b` conflict, if they do. Same target is checked first.
    pub fn conflict_kind(&self, a: &Action, b: &Action) -> Option<ConflictKind> {
        if a.target == b.target {
            Some(ConflictKind::SameTarget)
        } else if a.action_type.conflicts_with(b.action_type) {
            Some(ConflictKind::IncompatibleTypes)
        } else {
            None
        }
    }

    /// Every conflicting unordered pair, in nested-loop order over the batch.
    pub fn detect_conflicts(&self, actions: &[Action]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        for (i, a) in actions.iter().enumerate() {
            for (j, b) in actions.iter().enumerate().skip(i + 1) {
                if let Some(kind) = self.conflict_kind(a, b) {
                    conflicts.push(Conflict {
                        first: i,
                        second: j,
                        kind,
                    });
                }
            }
        }
        conflicts
    }

    /// Pick the winner of a conflicting pair. First matching rule wins:
    ///
    /// 1. same target and exactly one side deterministic: deterministic wins
    /// 2. exactly one side AI-driven below the confidence threshold: it loses
    /// 3. different priorities: higher wins
    /// 4. otherwise the earlier submission wins
    pub fn resolve<'a>(&self, a: &'a Action, b: &'a Action) -> (&'a Action, ResolutionRule) {
        if a.target == b.target {
            let a_det = a.source == ActionSource::Deterministic;
            let b_det = b.source == ActionSource::Deterministic;
            if a_det && !b_det {
                return (a, ResolutionRule::SameTarget);
            }
            if b_det && !a_det {
                return (b, ResolutionRule::SameTarget);
            }
        }

        let a_weak = a.is_low_confidence_ai(self.confidence_threshold);
        let b_weak = b.is_low_confidence_ai(self.confidence_threshold);
        if a_weak && !b_weak {
            return (b, ResolutionRule::LowConfidence);
        }
        if b_weak && !a_weak {
            return (a, ResolutionRule::LowConfidence);
        }

        if a.priority != b.priority {
            let winner = if a.priority > b.priority { a } else { b };
            return (winner, ResolutionRule::Priority);
        }

        let winner = if a.sequence <= b.sequence { a } else { b };
        (winner, ResolutionRule::SubmissionOrder)
    }

    /// Greedy pairwise elimination. A pair is only decided while both of
    /// its actions are still in the working set.
    pub fn resolve_conflicts(&self, conflicts: &[Conflict], batch: &[Action]) -> Resolution {
        let mut alive = vec![true; batch.len()];
        let mut cancelled = Vec::new();

        for conflict in conflicts {
            let (i, j) = (conflict.first, conflict.second);
            if i >= batch.len() || j >= batch.len() || !alive[i] || !alive[j] {
                continue;
            }

            let (winner, rule) = self.resolve(&batch[i], &batch[j]);
            let loser = if std::ptr::eq(winner, &batch[i]) { j } else { i };
            alive[loser] = false;

            tracing::info!(
                winner = %winner.id,
                loser = %batch[loser].id,
                conflict_type = %conflict.kind,
                rule = %rule,
                "Conflict resolved"
            );

            cancelled.push(Cancellation {
                loser: batch[loser].clone(),
                winner_id: winner.id.clone(),
                kind: conflict.kind,
                rule,
            });
        }

        let kept = batch
            .iter()
            .zip(alive)
            .filter(|(_, keep)| *keep)
            .map(|(a, _)| a.clone())
            .collect();

        Resolution { kept, cancelled }
    }

    /// Detect and resolve in one call.
    pub fn partition(&self, batch: &[Action]) -> (Vec<Conflict>, Resolution) {
        let conflicts = self.detect_conflicts(batch);
        let resolution = if conflicts.is_empty() {
            Resolution {
                kept: batch.to_vec(),
                cancelled: Vec::new(),
            }
        } else {
            self.resolve_conflicts(&conflicts, batch)
        };
        (conflicts, resolution)
    }
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::from_config(&ConflictConfig::default())
    }
}
