use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{MedicError, Result};

/// Top-level configuration for the coordination engine.
///
/// Loaded from a TOML file. Every section falls back to its defaults when
/// omitted, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MedicConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub conflict: ConflictConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
}

impl MedicConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: MedicConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| MedicError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.tick_interval_secs == 0 {
            return Err(MedicError::Config(
                "scheduler.tick_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.scheduler.max_concurrent_executions == 0 {
            return Err(MedicError::Config(
                "scheduler.max_concurrent_executions must be greater than 0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.conflict.confidence_threshold) {
            return Err(MedicError::Config(format!(
                "conflict.confidence_threshold must be within [0, 1], got {}",
                self.conflict.confidence_threshold
            )));
        }
        if self.anomaly.zscore_threshold <= 0.0 {
            return Err(MedicError::Config(
                "anomaly.zscore_threshold must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// General service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
    /// Address the HTTP server binds to.
    pub bind_address: String,
    /// HTTP server port.
    pub port: u16,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Scheduler loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between two ticks.
    pub tick_interval_secs: u64,
    /// Upper bound on executor calls running at once within a tick.
    pub max_concurrent_executions: usize,
    /// Pause after a loop-level failure before the next tick.
    pub error_backoff_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 5,
            max_concurrent_executions: 8,
            error_backoff_secs: 10,
        }
    }
}

/// Executor settings. Timeouts are per action type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub node_remediation_timeout_secs: u64,
    pub model_inference_timeout_secs: u64,
    pub alert_correlation_timeout_secs: u64,
    pub resource_scaling_timeout_secs: u64,
    /// Artificial delay the built-in executors spend "working".
    pub simulated_latency_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            node_remediation_timeout_secs: 120,
            model_inference_timeout_secs: 60,
            alert_correlation_timeout_secs: 60,
            resource_scaling_timeout_secs: 180,
            simulated_latency_ms: 0,
        }
    }
}

/// Conflict resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConflictConfig {
    /// AI-driven actions below this confidence lose every conflict.
    pub confidence_threshold: f64,
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
        }
    }
}

/// Health reporting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Queue length above which the engine reports itself unhealthy.
    pub max_queue_length: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_queue_length: 100,
        }
    }
}

/// Built-in anomaly detector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// |z| above which a point is flagged.
    pub zscore_threshold: f64,
    /// Series shorter than this are skipped.
    pub min_points: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            zscore_threshold: 2.5,
            min_points: 3,
        }
    }
}
