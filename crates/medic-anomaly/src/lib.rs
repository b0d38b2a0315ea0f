//! Medic anomaly crate - pluggable detectors over metric series.
//!
//! Provides:
//! - The `Detector` trait and the built-in z-score detector
//! - An ensemble that runs detectors with per-detector error isolation
//! - Analysis reports (alerts and recommendations) built on ensemble results

pub mod analysis;
pub mod detector;
pub mod ensemble;
pub mod error;
pub mod types;
pub mod zscore;

pub use analysis::{AnalysisReport, AnalyzeRequest};
pub use detector::Detector;
pub use ensemble::AnomalyEnsemble;
pub use error::DetectorError;
pub use types::{Anomaly, AnomalyKind, DetectorInfo, DetectorReport, EnsembleResult, MetricSeries};
pub use zscore::ZScoreDetector;
