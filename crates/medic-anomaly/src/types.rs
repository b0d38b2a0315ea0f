use std::collections::BTreeMap;

use medic_core::Severity;
use serde::{Deserialize, Serialize};

/// A named metric series, pre-formatted by the metrics collaborator.
///
/// `timestamps` is parallel to `values` but may be shorter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub name: String,
    pub values: Vec<f64>,
    #[serde(default)]
    pub timestamps: Vec<String>,
}

impl MetricSeries {
    pub fn new(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values,
            timestamps: Vec::new(),
        }
    }

    pub fn with_timestamps(mut self, timestamps: Vec<String>) -> Self {
        self.timestamps = timestamps;
        self
    }
}

/// How an anomaly was detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    StatisticalOutlier,
}

/// A single flagged point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub metric: String,
    pub value: f64,
    pub expected_range: [f64; 2],
    pub z_score: f64,
    pub severity: Severity,
    pub confidence: f64,
    pub timestamp: String,
    pub model: String,
}

/// Static description of a detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorInfo {
    pub name: String,
    pub threshold: f64,
    pub trained: bool,
    pub version: String,
}

/// Outcome of one detector within an ensemble run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorReport {
    pub anomalies_count: usize,
    pub anomalies: Vec<Anomaly>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_info: Option<DetectorInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated result of running every selected detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub total_anomalies: usize,
    /// Mean confidence over all flagged points, 0.5 when nothing was flagged.
    pub ensemble_confidence: f64,
    pub severity_breakdown: BTreeMap<Severity, usize>,
    pub anomalies: Vec<Anomaly>,
    pub model_results: BTreeMap<String, DetectorReport>,
    pub models_used: Vec<String>,
    pub analysis_timestamp: String,
}
