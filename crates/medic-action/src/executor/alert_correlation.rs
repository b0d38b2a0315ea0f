//! Alert correlation executor.
//!
//! Groups alerts inside a correlation window and silences them for a
//! duration. Durations use the `<n>[smhd]` shorthand.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ExecutorError;
use crate::executor::{parse_view, simulate, Executor};
use crate::types::{Action, ActionType, ExecutionOutcome, Parameters};

fn default_silence() -> String {
    "1h".to_string()
}

fn default_window() -> String {
    "5m".to_string()
}

/// Typed view over an alert correlation's parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct AlertCorrelationParams {
    #[serde(default)]
    pub alert_labels: Parameters,
    #[serde(default = "default_silence")]
    pub silence_duration: String,
    #[serde(default = "default_window")]
    pub correlation_window: String,
    #[serde(default)]
    pub dry_run: bool,
}

/// Parse `<n>[smhd]`, e.g. `90s`, `5m`, `1h`, `2d`.
pub fn parse_duration(raw: &str) -> Result<Duration, ExecutorError> {
    let invalid = || ExecutorError::InvalidParameters(format!("invalid duration '{}'", raw));
    let raw_trimmed = raw.trim();
    let unit = raw_trimmed.chars().last().ok_or_else(invalid)?;
    let digits = &raw_trimmed[..raw_trimmed.len() - unit.len_utf8()];
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let n: u64 = digits.parse().map_err(|_| invalid())?;
    let secs = match unit {
        's' => n,
        'm' => n.checked_mul(60).ok_or_else(invalid)?,
        'h' => n.checked_mul(3_600).ok_or_else(invalid)?,
        'd' => n.checked_mul(86_400).ok_or_else(invalid)?,
        _ => return Err(invalid()),
    };
    Ok(Duration::from_secs(secs))
}

pub struct AlertCorrelationExecutor {
    latency: Duration,
}

impl AlertCorrelationExecutor {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for AlertCorrelationExecutor {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl Executor for AlertCorrelationExecutor {
    fn action_type(&self) -> ActionType {
        ActionType::AlertCorrelation
    }

    async fn execute(&self, action: &Action) -> Result<ExecutionOutcome, ExecutorError> {
        let params: AlertCorrelationParams = parse_view(&action.parameters)?;
        let silence = parse_duration(&params.silence_duration)?;
        let window = parse_duration(&params.correlation_window)?;

        let summary = format!(
            "correlate alerts for {} over {}s and silence for {}s ({} label matchers)",
            action.target,
            window.as_secs(),
            silence.as_secs(),
            params.alert_labels.len()
        );

        if params.dry_run {
            return Ok(ExecutionOutcome::dry_run(format!("Would {}", summary)));
        }

        tracing::info!(
            action_id = %action.id,
            target = %action.target,
            window_secs = window.as_secs(),
            silence_secs = silence.as_secs(),
            "Alert correlation"
        );
        simulate(self.latency).await;

        Ok(ExecutionOutcome::new(format!("Did {}", summary)))
    }

    fn describe(&self, action: &Action) -> String {
        format!("Correlate and silence alerts for {}", action.target)
    }
}
