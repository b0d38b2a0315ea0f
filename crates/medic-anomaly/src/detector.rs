//! Detector trait definition.

use crate::error::DetectorError;
use crate::types::{Anomaly, DetectorInfo, MetricSeries};

/// A pluggable anomaly detector.
///
/// Detectors are stateless per call: the ensemble hands every selected
/// detector the same series and merges the results.
pub trait Detector: Send + Sync {
    /// Name used for selection (case-insensitive) and result keys.
    fn name(&self) -> &str;

    fn info(&self) -> DetectorInfo;

    fn detect(&self, series: &[MetricSeries]) -> Result<Vec<Anomaly>, DetectorError>;
}
