//! Threat detection: records, findings, the detector set and the pipeline
//! that runs them.

pub mod anomaly;
pub mod engine;
pub mod finding;
pub mod model;
pub mod patterns;
pub mod record;

pub use self::anomaly::{run_sweep_loop, AnomalyDetector, RateWindow};
pub use self::engine::DetectionPipeline;
pub use self::finding::{Finding, IdGenerator};
pub use self::model::{StaticModelDetector, StochasticDetector};
pub use self::patterns::{PatternDetector, PortDetector};
pub use self::record::Record;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("detector {detector} failed: {reason}")]
    DetectorFailed {
        detector: &'static str,
        reason: String,
    },
}

/// Severity levels for findings, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Low,
        Severity::Medium,
        Severity::High,
        Severity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of signal a finding represents. New detectors add a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingType {
    SuspiciousPattern,
    SuspiciousPort,
    MlDetectedThreat,
    AnomalyDetected,
    AiDetectedThreat,
}

impl FindingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingType::SuspiciousPattern => "suspicious_pattern",
            FindingType::SuspiciousPort => "suspicious_port",
            FindingType::MlDetectedThreat => "ml_detected_threat",
            FindingType::AnomalyDetected => "anomaly_detected",
            FindingType::AiDetectedThreat => "ai_detected_threat",
        }
    }
}

impl std::fmt::Display for FindingType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The detector that produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    PatternMatching,
    PortAnalysis,
    MlModel,
    AnomalyDetection,
    AiModel,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::PatternMatching => "pattern_matching",
            DetectionMethod::PortAnalysis => "port_analysis",
            DetectionMethod::MlModel => "ml_model",
            DetectionMethod::AnomalyDetection => "anomaly_detection",
            DetectionMethod::AiModel => "ai_model",
        }
    }
}

impl std::fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run context handed to every detector in a pipeline pass.
pub struct DetectContext<'a> {
    /// Arrival time of the record; every finding from this run carries it.
    pub now: DateTime<Utc>,
    pub ids: &'a IdGenerator,
}

/// Common interface for every detection rule or model.
///
/// Implementations must be safe to call from many requests at once; any state
/// that outlives a call lives behind the implementation's own lock.
#[async_trait::async_trait]
pub trait Detector: Send + Sync {
    /// Stable detector name used in logs and the model inventory.
    fn name(&self) -> &'static str;

    fn method(&self) -> DetectionMethod;

    /// Examine a record and return zero or more findings.
    async fn detect(
        &self,
        record: &Record,
        ctx: &DetectContext<'_>,
    ) -> Result<Vec<Finding>, DetectError>;
}
