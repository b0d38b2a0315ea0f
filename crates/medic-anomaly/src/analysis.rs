//! Analysis report built on top of an ensemble run.
//!
//! Adds alerts and recommendations keyed off the metric name so callers
//! (dashboards, chat backends) get something actionable, not just points.

use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

use medic_core::Severity;
use serde::{Deserialize, Serialize};

use crate::ensemble::AnomalyEnsemble;
use crate::types::{Anomaly, AnomalyKind, DetectorReport, MetricSeries};

fn default_time_range() -> String {
    "1h".to_string()
}

/// Body of an analyze call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[serde(default = "default_time_range")]
    pub time_range: String,
    #[serde(default)]
    pub metrics: Vec<MetricSeries>,
    /// Echoed back in the report; detection uses the configured threshold.
    #[serde(default)]
    pub threshold: Option<f64>,
    #[serde(default)]
    pub models: Option<Vec<String>>,
}

impl AnalyzeRequest {
    pub fn new(metrics: Vec<MetricSeries>) -> Self {
        Self {
            time_range: default_time_range(),
            metrics,
            threshold: None,
            models: None,
        }
    }
}

/// Alert category derived from the metric name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ResourceExhaustion,
    MemoryIssue,
    NetworkIssue,
    GeneralAnomaly,
}

impl AlertKind {
    pub fn for_metric(metric: &str) -> Self {
        let lower = metric.to_lowercase();
        if lower.contains("cpu") {
            AlertKind::ResourceExhaustion
        } else if lower.contains("memory") {
            AlertKind::MemoryIssue
        } else if lower.contains("network") {
            AlertKind::NetworkIssue
        } else {
            AlertKind::GeneralAnomaly
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub kind: AlertKind,
    pub metric: String,
    pub message: String,
    pub severity: Severity,
    pub action_required: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub metrics_analyzed: usize,
    pub models_used: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub time_range: String,
    pub anomalies_detected: usize,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub patterns: Vec<Anomaly>,
    pub alerts: Vec<Alert>,
    pub recommendations: Vec<String>,
    pub severity_breakdown: BTreeMap<Severity, usize>,
    pub model_results: BTreeMap<String, DetectorReport>,
    pub metadata: AnalysisMetadata,
    pub timestamp: String,
}

impl AnomalyEnsemble {
    /// Run the ensemble and wrap the result in an [`AnalysisReport`].
    pub fn analyze(&self, request: &AnalyzeRequest) -> AnalysisReport {
        let started = Instant::now();
        let result = self.detect(&request.metrics, request.models.as_deref());

        let alerts = result.anomalies.iter().map(alert_for).collect();

        let mut seen = HashSet::new();
        let recommendations = result
            .anomalies
            .iter()
            .map(recommendation_for)
            .filter(|r| seen.insert(r.clone()))
            .collect();

        tracing::info!(
            metrics = request.metrics.len(),
            anomalies = result.total_anomalies,
            "Anomaly analysis completed"
        );

        AnalysisReport {
            time_range: request.time_range.clone(),
            anomalies_detected: result.total_anomalies,
            confidence: result.ensemble_confidence,
            threshold: request.threshold,
            patterns: result.anomalies,
            alerts,
            recommendations,
            severity_breakdown: result.severity_breakdown,
            model_results: result.model_results,
            metadata: AnalysisMetadata {
                metrics_analyzed: request.metrics.len(),
                models_used: result.models_used,
                duration_ms: started.elapsed().as_millis() as u64,
            },
            timestamp: result.analysis_timestamp,
        }
    }
}

fn alert_for(anomaly: &Anomaly) -> Alert {
    let kind = AlertKind::for_metric(&anomaly.metric);
    let message = match kind {
        AlertKind::ResourceExhaustion => format!("CPU anomaly detected in {}", anomaly.metric),
        AlertKind::MemoryIssue => format!("Memory anomaly detected in {}", anomaly.metric),
        AlertKind::NetworkIssue => format!("Network anomaly detected in {}", anomaly.metric),
        AlertKind::GeneralAnomaly => format!("Anomaly detected in {}", anomaly.metric),
    };
    Alert {
        kind,
        metric: anomaly.metric.clone(),
        message,
        severity: anomaly.severity,
        action_required: anomaly.severity.requires_action(),
    }
}

fn recommendation_for(anomaly: &Anomaly) -> String {
    match (AlertKind::for_metric(&anomaly.metric), anomaly.kind) {
        (AlertKind::ResourceExhaustion, AnomalyKind::StatisticalOutlier) => {
            "Investigate CPU spike - check for resource-intensive processes".to_string()
        }
        (AlertKind::MemoryIssue, AnomalyKind::StatisticalOutlier) => {
            "Memory usage outlier - review memory limits and look for leaks".to_string()
        }
        (AlertKind::NetworkIssue, _) => {
            "Network anomaly detected - check network policies and connectivity".to_string()
        }
        (AlertKind::GeneralAnomaly, _) => {
            format!("Anomaly detected in {} - investigate further", anomaly.metric)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medic_core::config::AnomalyConfig;

    fn spike(name: &str, peak: f64) -> MetricSeries {
        let mut values = vec![10.0; 19];
        values.push(peak);
        MetricSeries::new(name, values)
    }

    fn ensemble() -> AnomalyEnsemble {
        AnomalyEnsemble::with_defaults(&AnomalyConfig::default())
    }

    #[test]
    fn test_alert_kind_by_metric_name() {
        assert_eq!(AlertKind::for_metric("node_cpu_usage"), AlertKind::ResourceExhaustion);
        assert_eq!(AlertKind::for_metric("Memory_RSS"), AlertKind::MemoryIssue);
        assert_eq!(AlertKind::for_metric("network_rx"), AlertKind::NetworkIssue);
        assert_eq!(AlertKind::for_metric("disk_io"), AlertKind::GeneralAnomaly);
    }

    #[test]
    fn test_report_for_cpu_spike() {
        let report = ensemble().analyze(&AnalyzeRequest::new(vec![spike("cpu", 200.0)]));

        assert_eq!(report.time_range, "1h");
        assert_eq!(report.anomalies_detected, 1);
        assert_eq!(report.patterns.len(), 1);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.alerts[0].kind, AlertKind::ResourceExhaustion);
        assert_eq!(report.alerts[0].severity, Severity::High);
        assert!(report.alerts[0].action_required);
        assert_eq!(report.metadata.metrics_analyzed, 1);
        assert_eq!(report.metadata.models_used, vec!["Statistical".to_string()]);
    }

    #[test]
    fn test_recommendations_are_deduplicated_in_order() {
        let request = AnalyzeRequest::new(vec![
            spike("cpu_a", 200.0),
            spike("disk", 200.0),
            spike("cpu_b", 200.0),
        ]);
        let report = ensemble().analyze(&request);

        assert_eq!(report.anomalies_detected, 3);
        assert_eq!(report.alerts.len(), 3);
        assert_eq!(
            report.recommendations,
            vec![
                "Investigate CPU spike - check for resource-intensive processes".to_string(),
                "Anomaly detected in disk - investigate further".to_string(),
            ]
        );
    }

    #[test]
    fn test_medium_anomaly_needs_no_action() {
        let mut values = vec![10.0; 9];
        values.push(95.0);
        let report = ensemble().analyze(&AnalyzeRequest::new(vec![MetricSeries::new(
            "network_tx",
            values,
        )]));
        assert_eq!(report.alerts[0].severity, Severity::Medium);
        assert!(!report.alerts[0].action_required);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{"metrics":[{"name":"cpu","values":[1.0,2.0,3.0]}],"models":["statistical"]}"#;
        let request: AnalyzeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.time_range, "1h");
        assert_eq!(request.metrics[0].timestamps.len(), 0);
        assert_eq!(request.models.as_deref(), Some(&["statistical".to_string()][..]));
    }

    #[test]
    fn test_empty_request_reports_nothing() {
        let report = ensemble().analyze(&AnalyzeRequest::new(Vec::new()));
        assert_eq!(report.anomalies_detected, 0);
        assert!(report.alerts.is_empty());
        assert!(report.recommendations.is_empty());
        assert!((report.confidence - 0.5).abs() < f64::EPSILON);
    }
}
