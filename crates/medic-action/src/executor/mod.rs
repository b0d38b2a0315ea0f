//! Executor registry and trait definition.
//!
//! Defines the `Executor` async trait and the registry the scheduler uses
//! to dispatch an action to the implementation for its type, together with
//! that type's call timeout.

pub mod alert_correlation;
pub mod model_inference;
pub mod node_remediation;
pub mod resource_scaling;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use medic_core::config::ExecutorConfig;
use serde::de::DeserializeOwned;

use crate::error::ExecutorError;
use crate::types::{Action, ActionType, ExecutionOutcome, Parameters};

pub use alert_correlation::AlertCorrelationExecutor;
pub use model_inference::ModelInferenceExecutor;
pub use node_remediation::NodeRemediationExecutor;
pub use resource_scaling::ResourceScalingExecutor;

/// Timeout used for a type with no configured value.
const FALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Performs the real-world effect of one action type.
#[async_trait]
pub trait Executor: Send + Sync {
    fn action_type(&self) -> ActionType;

    async fn execute(&self, action: &Action) -> Result<ExecutionOutcome, ExecutorError>;

    /// Human-readable summary of what `execute` would do.
    fn describe(&self, action: &Action) -> String;
}

/// Executors and per-type timeouts, keyed by action type.
pub struct ExecutorRegistry {
    executors: HashMap<ActionType, Arc<dyn Executor>>,
    timeouts: HashMap<ActionType, Duration>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
            timeouts: HashMap::new(),
        }
    }

    /// Registry with the four built-in executors and configured timeouts.
    pub fn with_defaults(config: &ExecutorConfig) -> Self {
        let latency = Duration::from_millis(config.simulated_latency_ms);
        let mut registry = Self::new();
        registry.register(Arc::new(NodeRemediationExecutor::new(latency)));
        registry.register(Arc::new(ModelInferenceExecutor::new(latency)));
        registry.register(Arc::new(AlertCorrelationExecutor::new(latency)));
        registry.register(Arc::new(ResourceScalingExecutor::new(latency)));

        registry.set_timeout(
            ActionType::NodeRemediation,
            Duration::from_secs(config.node_remediation_timeout_secs),
        );
        registry.set_timeout(
            ActionType::ModelInference,
            Duration::from_secs(config.model_inference_timeout_secs),
        );
        registry.set_timeout(
            ActionType::AlertCorrelation,
            Duration::from_secs(config.alert_correlation_timeout_secs),
        );
        registry.set_timeout(
            ActionType::ResourceScaling,
            Duration::from_secs(config.resource_scaling_timeout_secs),
        );
        registry
    }

    /// Register an executor, replacing any previous one for its type.
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        self.executors.insert(executor.action_type(), executor);
    }

    pub fn get(&self, action_type: ActionType) -> Option<Arc<dyn Executor>> {
        self.executors.get(&action_type).cloned()
    }

    /// What the registered executor would do for `action`, if one exists.
    pub fn describe(&self, action: &Action) -> Option<String> {
        self.executors
            .get(&action.action_type)
            .map(|executor| executor.describe(action))
    }

    pub fn set_timeout(&mut self, action_type: ActionType, timeout: Duration) {
        self.timeouts.insert(action_type, timeout);
    }

    pub fn timeout_for(&self, action_type: ActionType) -> Duration {
        self.timeouts
            .get(&action_type)
            .copied()
            .unwrap_or(FALLBACK_TIMEOUT)
    }

    pub fn registered_types(&self) -> Vec<ActionType> {
        ActionType::ALL
            .into_iter()
            .filter(|t| self.executors.contains_key(t))
            .collect()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Deserialize an executor's typed view over the open parameter map.
/// Keys the view does not name are ignored.
pub fn parse_view<T: DeserializeOwned>(parameters: &Parameters) -> Result<T, ExecutorError> {
    serde_json::from_value(serde_json::Value::Object(parameters.clone()))
        .map_err(|e| ExecutorError::InvalidParameters(e.to_string()))
}

/// Stand-in for the latency of a real effect.
async fn simulate(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionRequest, ActionSource};
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct View {
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_with_defaults_registers_every_type() {
        let registry = ExecutorRegistry::with_defaults(&ExecutorConfig::default());
        assert_eq!(registry.registered_types(), ActionType::ALL.to_vec());
        for t in ActionType::ALL {
            assert_eq!(registry.get(t).unwrap().action_type(), t);
        }
    }

    #[test]
    fn test_timeouts_are_per_type() {
        let registry = ExecutorRegistry::with_defaults(&ExecutorConfig::default());
        assert_eq!(
            registry.timeout_for(ActionType::NodeRemediation),
            Duration::from_secs(120)
        );
        assert_eq!(
            registry.timeout_for(ActionType::ResourceScaling),
            Duration::from_secs(180)
        );
        assert_eq!(
            registry.timeout_for(ActionType::ModelInference),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_empty_registry() {
        let registry = ExecutorRegistry::new();
        assert!(registry.get(ActionType::ModelInference).is_none());
        assert_eq!(
            registry.timeout_for(ActionType::ModelInference),
            FALLBACK_TIMEOUT
        );
        assert!(registry.registered_types().is_empty());
    }

    #[test]
    fn test_parse_view_ignores_unknown_keys() {
        let mut params = Parameters::new();
        params.insert("count".to_string(), serde_json::json!(3));
        params.insert("title".to_string(), serde_json::json!("disk pressure"));
        let view: View = parse_view(&params).unwrap();
        assert_eq!(view.count, 3);
    }

    #[test]
    fn test_parse_view_type_mismatch_is_invalid_parameters() {
        let mut params = Parameters::new();
        params.insert("count".to_string(), serde_json::json!("three"));
        let err = parse_view::<View>(&params).err().unwrap();
        assert!(matches!(err, ExecutorError::InvalidParameters(_)));
    }

    #[test]
    fn test_describe_mentions_target() {
        let registry = ExecutorRegistry::with_defaults(&ExecutorConfig::default());
        let action = ActionRequest::new(
            ActionType::NodeRemediation,
            ActionSource::Deterministic,
            5,
            "worker-3",
        )
        .into_action()
        .unwrap();
        let executor = registry.get(ActionType::NodeRemediation).unwrap();
        assert!(executor.describe(&action).contains("worker-3"));
        assert_eq!(registry.describe(&action), Some(executor.describe(&action)));
        assert!(ExecutorRegistry::new().describe(&action).is_none());
    }
}
