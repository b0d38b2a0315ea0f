//! Ensemble anomaly detection.
//!
//! Runs every selected detector over the same series and merges the
//! results. A failing detector is recorded in its own report and never
//! aborts the others.

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use medic_core::config::AnomalyConfig;
use medic_core::{Severity, Timestamp};

use crate::detector::Detector;
use crate::error::DetectorError;
use crate::types::{Anomaly, DetectorReport, EnsembleResult, MetricSeries};
use crate::zscore::ZScoreDetector;

/// Confidence reported when no detector flagged anything.
const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// A set of detectors run together.
#[derive(Clone, Default)]
pub struct AnomalyEnsemble {
    detectors: Vec<Arc<dyn Detector>>,
}

impl AnomalyEnsemble {
    /// Create an ensemble with no detectors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an ensemble with the built-in detectors.
    pub fn with_defaults(config: &AnomalyConfig) -> Self {
        let mut ensemble = Self::new();
        ensemble.register(Arc::new(ZScoreDetector::from_config(config)));
        ensemble
    }

    pub fn register(&mut self, detector: Arc<dyn Detector>) {
        self.detectors.push(detector);
    }

    pub fn detector_names(&self) -> Vec<String> {
        self.detectors.iter().map(|d| d.name().to_string()).collect()
    }

    /// Run the selected detectors (all of them when `model_names` is `None`
    /// or empty; names match case-insensitively).
    pub fn detect(&self, series: &[MetricSeries], model_names: Option<&[String]>) -> EnsembleResult {
        let selected: Vec<&Arc<dyn Detector>> = match model_names {
            Some(names) if !names.is_empty() => self
                .detectors
                .iter()
                .filter(|d| names.iter().any(|n| n.eq_ignore_ascii_case(d.name())))
                .collect(),
            _ => self.detectors.iter().collect(),
        };

        let mut all_anomalies: Vec<Anomaly> = Vec::new();
        let mut model_results = BTreeMap::new();

        for detector in &selected {
            let report = match run_isolated(detector.as_ref(), series) {
                Ok(anomalies) => {
                    all_anomalies.extend(anomalies.iter().cloned());
                    DetectorReport {
                        anomalies_count: anomalies.len(),
                        anomalies,
                        model_info: Some(detector.info()),
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::error!(detector = %detector.name(), error = %e, "Detector failed");
                    DetectorReport {
                        anomalies_count: 0,
                        anomalies: Vec::new(),
                        model_info: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            model_results.insert(detector.name().to_string(), report);
        }

        let total_anomalies = all_anomalies.len();
        let ensemble_confidence = if total_anomalies > 0 {
            let mean =
                all_anomalies.iter().map(|a| a.confidence).sum::<f64>() / total_anomalies as f64;
            (mean * 1000.0).round() / 1000.0
        } else {
            NEUTRAL_CONFIDENCE
        };

        let mut severity_breakdown: BTreeMap<Severity, usize> =
            Severity::ALL.iter().map(|s| (*s, 0)).collect();
        for anomaly in &all_anomalies {
            *severity_breakdown.entry(anomaly.severity).or_insert(0) += 1;
        }

        tracing::debug!(
            detectors = selected.len(),
            series = series.len(),
            total_anomalies,
            "Ensemble analysis finished"
        );

        EnsembleResult {
            total_anomalies,
            ensemble_confidence,
            severity_breakdown,
            anomalies: all_anomalies,
            model_results,
            models_used: selected.iter().map(|d| d.name().to_string()).collect(),
            analysis_timestamp: Timestamp::now().to_rfc3339(),
        }
    }
}

fn run_isolated(
    detector: &dyn Detector,
    series: &[MetricSeries],
) -> Result<Vec<Anomaly>, DetectorError> {
    match catch_unwind(AssertUnwindSafe(|| detector.detect(series))) {
        Ok(result) => result,
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(DetectorError::Panicked(msg))
        }
    }
}
