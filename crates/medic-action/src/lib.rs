//! Action coordination engine.
//!
//! Accepts remediation actions from many producers, resolves conflicts
//! between them batch by batch, executes the survivors through pluggable
//! executors and tracks every action through its lifecycle.

pub mod conflict;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod executor;
pub mod incident;
pub mod metrics;
pub mod remediation;
pub mod scheduler;
pub mod store;
pub mod types;

pub use conflict::{Conflict, ConflictKind, ConflictResolver, Resolution, ResolutionRule};
pub use coordinator::{Coordinator, HealthReport, HealthStatus};
pub use error::{ActionError, ExecutorError, SchedulerError};
pub use events::EngineEvent;
pub use executor::{Executor, ExecutorRegistry};
pub use metrics::EngineMetrics;
pub use scheduler::{Scheduler, TickReport};
pub use store::ActionStore;
pub use types::{
    Action, ActionFilter, ActionPage, ActionPatch, ActionRequest, ActionSource, ActionStatus,
    ActionType, ExecutionOutcome, Parameters, StatusClass, StoreStats,
};
