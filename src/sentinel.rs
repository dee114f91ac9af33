//! The detection core as seen by its callers: run the pipeline, record
//! findings, list and delete them, and read analytics.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::analysis::{self, AnalyticsSnapshot, StatsSnapshot};
use crate::config::{AnalyticsConfig, DetectionConfig};
use crate::detect::engine::DetectorInfo;
use crate::detect::{DetectionPipeline, Finding, RateWindow, Record};
use crate::storage::{Alert, AlertLog, FindingsLedger, StoreError};

/// Detector inventory plus the tunables that shape its output.
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub detectors: Vec<DetectorInfo>,
    pub suspicious_ports: Vec<i64>,
    pub pattern_count: usize,
    pub anomaly_window_secs: i64,
    pub anomaly_threshold: usize,
    pub stochastic_probability: f64,
    pub findings_issued: u64,
}

pub struct Sentinel {
    pipeline: DetectionPipeline,
    rate_window: Arc<RateWindow>,
    ledger: FindingsLedger,
    alerts: AlertLog,
    detection: DetectionConfig,
    analytics: AnalyticsConfig,
}

impl Sentinel {
    pub fn new(detection: DetectionConfig, analytics: AnalyticsConfig) -> Self {
        let rate_window = Arc::new(RateWindow::from_config(&detection));
        let pipeline = DetectionPipeline::from_config(&detection, rate_window.clone());
        Self {
            pipeline,
            rate_window,
            ledger: FindingsLedger::new(),
            alerts: AlertLog::new(),
            detection,
            analytics,
        }
    }

    /// Run the pipeline without persisting anything.
    pub async fn detect(&self, record: &Record) -> Vec<Finding> {
        self.pipeline.run(record).await
    }

    pub async fn detect_at(&self, record: &Record, now: DateTime<Utc>) -> Vec<Finding> {
        self.pipeline.run_at(record, now).await
    }

    pub async fn record(&self, findings: Vec<Finding>) -> Result<usize, StoreError> {
        self.ledger.record(findings).await
    }

    /// Detect and record in one step; returns the findings that were stored.
    pub async fn detect_and_record(&self, record: &Record) -> Result<Vec<Finding>, StoreError> {
        let findings = self.detect(record).await;
        self.ledger.record(findings.clone()).await?;
        Ok(findings)
    }

    pub async fn list(&self) -> Vec<Finding> {
        self.ledger.list().await
    }

    pub async fn list_recent(&self, limit: usize) -> Vec<Finding> {
        self.ledger.list_recent(limit).await
    }

    /// Most recent `limit` findings (all when `None`) and the store size,
    /// read together.
    pub async fn list_with_total(&self, limit: Option<usize>) -> (Vec<Finding>, usize) {
        self.ledger.list_with_total(limit).await
    }

    /// Delete a finding; returns it and the number of findings left.
    pub async fn remove(&self, id: &str) -> Result<(Finding, usize), StoreError> {
        self.ledger.remove(id).await
    }

    pub async fn total(&self) -> usize {
        self.ledger.len().await
    }

    pub async fn raise_config_alert(&self, config: Value) -> Alert {
        self.alerts.raise_config_update(config, Utc::now()).await
    }

    pub async fn list_alerts(&self, limit: usize) -> Vec<Alert> {
        self.alerts.list_recent(limit).await
    }

    pub async fn analytics(&self, now: DateTime<Utc>) -> AnalyticsSnapshot {
        analysis::snapshot(
            &self.ledger,
            &self.alerts,
            now,
            self.analytics.recent_window_hours,
        )
        .await
    }

    pub async fn stats(&self) -> StatsSnapshot {
        analysis::stats(&self.ledger, &self.alerts, Utc::now()).await
    }

    pub fn model_status(&self) -> ModelStatus {
        ModelStatus {
            detectors: self.pipeline.detectors(),
            suspicious_ports: self.detection.suspicious_ports.clone(),
            pattern_count: self.detection.patterns.len(),
            anomaly_window_secs: self.rate_window.window().num_seconds(),
            anomaly_threshold: self.detection.anomaly_threshold,
            stochastic_probability: self.detection.stochastic_probability,
            findings_issued: self.pipeline.ids().issued(),
        }
    }

    pub fn rate_window(&self) -> &Arc<RateWindow> {
        &self.rate_window
    }
}
