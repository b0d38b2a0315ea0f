//! Node remediation executor.
//!
//! Restarts workloads on a node. The cluster call itself is out of scope;
//! the executor validates its parameters and logs the restart it would issue.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ExecutorError;
use crate::executor::{parse_view, simulate, Executor};
use crate::types::{Action, ActionType, ExecutionOutcome};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartStrategy {
    #[default]
    Rolling,
    Recreate,
}

fn default_grace_period() -> i64 {
    30
}

/// Typed view over a node remediation's parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeRemediationParams {
    #[serde(default)]
    pub restart_strategy: RestartStrategy,
    #[serde(default = "default_grace_period")]
    pub grace_period: i64,
    #[serde(default)]
    pub force_restart: bool,
    #[serde(default)]
    pub dry_run: bool,
}

impl NodeRemediationParams {
    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.grace_period < 0 {
            return Err(ExecutorError::InvalidParameters(format!(
                "grace_period must be >= 0, got {}",
                self.grace_period
            )));
        }
        Ok(())
    }
}

pub struct NodeRemediationExecutor {
    latency: Duration,
}

impl NodeRemediationExecutor {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for NodeRemediationExecutor {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl Executor for NodeRemediationExecutor {
    fn action_type(&self) -> ActionType {
        ActionType::NodeRemediation
    }

    async fn execute(&self, action: &Action) -> Result<ExecutionOutcome, ExecutorError> {
        let params: NodeRemediationParams = parse_view(&action.parameters)?;
        params.validate()?;

        let summary = format!(
            "{:?} restart of {} (grace {}s{})",
            params.restart_strategy,
            action.target,
            params.grace_period,
            if params.force_restart { ", forced" } else { "" }
        );

        if params.dry_run {
            return Ok(ExecutionOutcome::dry_run(format!("Would perform {}", summary)));
        }

        tracing::info!(
            action_id = %action.id,
            target = %action.target,
            strategy = ?params.restart_strategy,
            grace_period = params.grace_period,
            force = params.force_restart,
            "Node remediation"
        );
        simulate(self.latency).await;

        Ok(ExecutionOutcome::new(format!("Performed {}", summary)))
    }

    fn describe(&self, action: &Action) -> String {
        format!("Restart workloads on {}", action.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionRequest, ActionSource, Parameters};

    fn action(params: serde_json::Value) -> Action {
        let parameters: Parameters = serde_json::from_value(params).unwrap();
        ActionRequest::new(ActionType::NodeRemediation, ActionSource::Deterministic, 5, "node1")
            .with_parameters(parameters)
            .into_action()
            .unwrap()
    }

    #[tokio::test]
    async fn test_defaults_to_rolling_restart() {
        let outcome = NodeRemediationExecutor::default()
            .execute(&action(serde_json::json!({})))
            .await
            .unwrap();
        assert!(!outcome.dry_run);
        assert!(outcome.message.contains("Rolling restart of node1"));
        assert!(outcome.message.contains("grace 30s"));
    }

    #[tokio::test]
    async fn test_recreate_forced() {
        let outcome = NodeRemediationExecutor::default()
            .execute(&action(serde_json::json!({
                "restart_strategy": "recreate",
                "grace_period": 0,
                "force_restart": true
            })))
            .await
            .unwrap();
        assert!(outcome.message.contains("Recreate restart"));
        assert!(outcome.message.contains("forced"));
    }

    #[tokio::test]
    async fn test_unknown_strategy_is_invalid() {
        let err = NodeRemediationExecutor::default()
            .execute(&action(serde_json::json!({"restart_strategy": "reboot"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_negative_grace_period_is_invalid() {
        let err = NodeRemediationExecutor::default()
            .execute(&action(serde_json::json!({"grace_period": -5})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("grace_period"));
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_effect() {
        let outcome = NodeRemediationExecutor::default()
            .execute(&action(serde_json::json!({"dry_run": true})))
            .await
            .unwrap();
        assert!(outcome.dry_run);
        assert!(outcome.message.starts_with("Would perform"));
    }
}
