use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::DetectionConfig;
use crate::detect::{
    AnomalyDetector, DetectContext, DetectionMethod, Detector, Finding, IdGenerator,
    PatternDetector, PortDetector, RateWindow, Record, StaticModelDetector, StochasticDetector,
};

/// Inventory entry describing one detector in the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct DetectorInfo {
    pub name: &'static str,
    pub method: DetectionMethod,
}

/// Runs every detector against a record, in a fixed order, and returns the
/// combined findings. The pipeline never stores findings; the only state it
/// touches is whatever the detectors own (the rate window, the id counter).
pub struct DetectionPipeline {
    detectors: Vec<Box<dyn Detector>>,
    ids: Arc<IdGenerator>,
}

impl DetectionPipeline {
    pub fn new(detectors: Vec<Box<dyn Detector>>, ids: Arc<IdGenerator>) -> Self {
        Self { detectors, ids }
    }

    /// The standard detector set: pattern, port, static model, anomaly, stochastic.
    pub fn from_config(config: &DetectionConfig, rate_window: Arc<RateWindow>) -> Self {
        let detectors: Vec<Box<dyn Detector>> = vec![
            Box::new(PatternDetector::from_config(config)),
            Box::new(PortDetector::from_config(config)),
            Box::new(StaticModelDetector::from_config(config)),
            Box::new(AnomalyDetector::new(rate_window, config.anomaly_threshold)),
            Box::new(StochasticDetector::from_config(config)),
        ];
        Self::new(detectors, Arc::new(IdGenerator::new()))
    }

    pub fn detectors(&self) -> Vec<DetectorInfo> {
        self.detectors
            .iter()
            .map(|d| DetectorInfo {
                name: d.name(),
                method: d.method(),
            })
            .collect()
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    pub async fn run(&self, record: &Record) -> Vec<Finding> {
        self.run_at(record, Utc::now()).await
    }

    /// Run the pipeline as if the record arrived at `now`.
    ///
    /// A detector that returns an error contributes nothing; the remaining
    /// detectors still run.
    pub async fn run_at(&self, record: &Record, now: DateTime<Utc>) -> Vec<Finding> {
        let ctx = DetectContext {
            now,
            ids: &self.ids,
        };

        let mut findings = Vec::new();
        for detector in &self.detectors {
            match detector.detect(record, &ctx).await {
                Ok(found) => findings.extend(found),
                Err(e) => {
                    warn!(detector = detector.name(), error = %e, "detector failed, skipping");
                }
            }
        }

        debug!(fields = record.fields().len(), findings = findings.len(), "pipeline run complete");
        findings
    }
}
