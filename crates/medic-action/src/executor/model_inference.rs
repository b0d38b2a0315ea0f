//! Model inference executor.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ExecutorError;
use crate::executor::{parse_view, simulate, Executor};
use crate::types::{Action, ActionType, ExecutionOutcome};

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInferenceParams {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub inputs: Option<serde_json::Value>,
    #[serde(default)]
    pub dry_run: bool,
}

pub struct ModelInferenceExecutor {
    latency: Duration,
}

impl ModelInferenceExecutor {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for ModelInferenceExecutor {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl Executor for ModelInferenceExecutor {
    fn action_type(&self) -> ActionType {
        ActionType::ModelInference
    }

    async fn execute(&self, action: &Action) -> Result<ExecutionOutcome, ExecutorError> {
        let params: ModelInferenceParams = parse_view(&action.parameters)?;
        let model = params.model.as_deref().unwrap_or("default");
        let summary = format!("run inference with model '{}' for {}", model, action.target);

        if params.dry_run {
            return Ok(ExecutionOutcome::dry_run(format!("Would {}", summary)));
        }

        tracing::info!(
            action_id = %action.id,
            target = %action.target,
            model = %model,
            has_inputs = params.inputs.is_some(),
            "Model inference"
        );
        simulate(self.latency).await;

        Ok(ExecutionOutcome::new(format!("Did {}", summary)))
    }

    fn describe(&self, action: &Action) -> String {
        format!("Run model inference for {}", action.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActionRequest, ActionSource, Parameters};

    fn action(params: serde_json::Value) -> Action {
        let parameters: Parameters = serde_json::from_value(params).unwrap();
        ActionRequest::new(ActionType::ModelInference, ActionSource::AiDriven, 6, "predictor")
            .with_parameters(parameters)
            .into_action()
            .unwrap()
    }

    #[tokio::test]
    async fn test_named_model() {
        let outcome = ModelInferenceExecutor::default()
            .execute(&action(serde_json::json!({"model": "isolation-forest", "inputs": [1, 2, 3]})))
            .await
            .unwrap();
        assert!(outcome.message.contains("'isolation-forest'"));
    }

    #[tokio::test]
    async fn test_default_model() {
        let outcome = ModelInferenceExecutor::default()
            .execute(&action(serde_json::json!({})))
            .await
            .unwrap();
        assert!(outcome.message.contains("'default'"));
    }

    #[tokio::test]
    async fn test_model_must_be_string() {
        let err = ModelInferenceExecutor::default()
            .execute(&action(serde_json::json!({"model": 42})))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::InvalidParameters(_)));
    }
}
