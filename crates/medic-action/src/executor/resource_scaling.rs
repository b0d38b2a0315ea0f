//! Resource scaling executor.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ExecutorError;
use crate::executor::{parse_view, simulate, Executor};
use crate::types::{Action, ActionType, ExecutionOutcome};

fn default_min_replicas() -> u32 {
    1
}

fn default_max_replicas() -> u32 {
    10
}

fn default_threshold() -> u32 {
    80
}

/// Typed view over a scaling action's parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceScalingParams {
    #[serde(default)]
    pub scaling_type: Option<String>,
    #[serde(default = "default_min_replicas")]
    pub min_replicas: u32,
    #[serde(default = "default_max_replicas")]
    pub max_replicas: u32,
    #[serde(default)]
    pub target_replicas: Option<u32>,
    #[serde(default = "default_threshold")]
    pub cpu_threshold: u32,
    #[serde(default = "default_threshold")]
    pub memory_threshold: u32,
    #[serde(default)]
    pub dry_run: bool,
}

impl ResourceScalingParams {
    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.min_replicas > self.max_replicas {
            return Err(ExecutorError::InvalidParameters(format!(
                "min_replicas ({}) exceeds max_replicas ({})",
                self.min_replicas, self.max_replicas
            )));
        }
        if let Some(target) = self.target_replicas {
            if target < self.min_replicas || target > self.max_replicas {
                return Err(ExecutorError::InvalidParameters(format!(
                    "target_replicas {} outside [{}, {}]",
                    target, self.min_replicas, self.max_replicas
                )));
            }
        }
        for (name, value) in [
            ("cpu_threshold", self.cpu_threshold),
            ("memory_threshold", self.memory_threshold),
        ] {
            if !(1..=100).contains(&value) {
                return Err(ExecutorError::InvalidParameters(format!(
                    "{} must be between 1 and 100, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

pub struct ResourceScalingExecutor {
    latency: Duration,
}

impl ResourceScalingExecutor {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for ResourceScalingExecutor {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl Executor for ResourceScalingExecutor {
    fn action_type(&self) -> ActionType {
        ActionType::ResourceScaling
    }

    async fn execute(&self, action: &Action) -> Result<ExecutionOutcome, ExecutorError> {
        let params: ResourceScalingParams = parse_view(&action.parameters)?;
        params.validate()?;

        let replicas = match params.target_replicas {
            Some(t) => format!("{} replicas", t),
            None => format!("{}-{} replicas", params.min_replicas, params.max_replicas),
        };
        let summary = format!(
            "scale {} to {} (cpu {}%, memory {}%)",
            action.target, replicas, params.cpu_threshold, params.memory_threshold
        );

        if params.dry_run {
            return Ok(ExecutionOutcome::dry_run(format!("Would {}", summary)));
        }

        tracing::info!(
            action_id = %action.id,
            target = %action.target,
            scaling_type = params.scaling_type.as_deref().unwrap_or("autoscale"),
            min_replicas = params.min_replicas,
            max_replicas = params.max_replicas,
            target_replicas = ?params.target_replicas,
            "Resource scaling"
        );
        simulate(self.latency).await;

        Ok(ExecutionOutcome::new(format!("Did {}", summary)))
    }

    fn describe(&self, action: &Action) -> String {
        format!("Scale {}", action.target)
    }
}
