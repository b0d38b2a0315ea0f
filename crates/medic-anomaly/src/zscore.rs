//! Z-score outlier detector.
//!
//! Flags every point whose distance from the series mean exceeds
//! `threshold` sample standard deviations.

use medic_core::config::AnomalyConfig;
use medic_core::{Severity, Timestamp};

use crate::detector::Detector;
use crate::error::DetectorError;
use crate::types::{Anomaly, AnomalyKind, DetectorInfo, MetricSeries};

const MODEL_NAME: &str = "Statistical";
const MODEL_VERSION: &str = "1.0.0";
/// |z| above which an outlier is reported as `high` rather than `medium`.
const HIGH_SEVERITY_Z: f64 = 3.0;
const MAX_CONFIDENCE: f64 = 0.95;

/// Statistical detector based on per-series z-scores. Needs no training.
pub struct ZScoreDetector {
    threshold: f64,
    min_points: usize,
}

impl ZScoreDetector {
    pub fn new(threshold: f64, min_points: usize) -> Self {
        Self {
            threshold,
            min_points: min_points.max(2),
        }
    }

    pub fn from_config(config: &AnomalyConfig) -> Self {
        Self::new(config.zscore_threshold, config.min_points)
    }

    fn detect_series(&self, series: &MetricSeries) -> Result<Vec<Anomaly>, DetectorError> {
        let values = &series.values;
        if values.len() < self.min_points {
            return Ok(Vec::new());
        }
        if let Some(bad) = values.iter().find(|v| !v.is_finite()) {
            return Err(DetectorError::InvalidSeries {
                name: series.name.clone(),
                reason: format!("non-finite value {}", bad),
            });
        }

        let (mean, std_dev) = mean_and_sample_std(values);
        if std_dev <= 0.0 {
            return Ok(Vec::new());
        }

        let band = self.threshold * std_dev;
        let anomalies = values
            .iter()
            .enumerate()
            .filter_map(|(i, &value)| {
                let z = (value - mean) / std_dev;
                if z.abs() <= self.threshold {
                    return None;
                }
                Some(Anomaly {
                    kind: AnomalyKind::StatisticalOutlier,
                    metric: series.name.clone(),
                    value,
                    expected_range: [mean - band, mean + band],
                    z_score: z,
                    severity: if z.abs() > HIGH_SEVERITY_Z {
                        Severity::High
                    } else {
                        Severity::Medium
                    },
                    confidence: (z.abs() / 4.0).min(MAX_CONFIDENCE),
                    timestamp: series
                        .timestamps
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| Timestamp::now().to_rfc3339()),
                    model: MODEL_NAME.to_string(),
                })
            })
            .collect();

        Ok(anomalies)
    }
}

impl Default for ZScoreDetector {
    fn default() -> Self {
        Self::from_config(&AnomalyConfig::default())
    }
}

impl Detector for ZScoreDetector {
    fn name(&self) -> &str {
        MODEL_NAME
    }

    fn info(&self) -> DetectorInfo {
        DetectorInfo {
            name: MODEL_NAME.to_string(),
            threshold: self.threshold,
            trained: true,
            version: MODEL_VERSION.to_string(),
        }
    }

    fn detect(&self, series: &[MetricSeries]) -> Result<Vec<Anomaly>, DetectorError> {
        let mut anomalies = Vec::new();
        for s in series {
            anomalies.extend(self.detect_series(s)?);
        }
        Ok(anomalies)
    }
}

/// Mean and sample (n - 1) standard deviation. Caller guarantees len >= 2.
fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, variance.sqrt())
}
