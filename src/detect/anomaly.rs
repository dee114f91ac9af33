//! Per-source rate tracking and the rate anomaly detector.
//!
//! The [`RateWindow`] keeps a sliding window of arrival times per source
//! identifier behind a single `tokio::sync::Mutex`, so concurrent callers
//! never lose an observation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{DetectionConfig, MAX_ANOMALY_WINDOW_SECS};
use crate::detect::{
    DetectContext, DetectError, DetectionMethod, Detector, Finding, FindingType, Record, Severity,
};

const ANOMALY_CONFIDENCE: f64 = 0.95;

// ---------------------------------------------------------------------------
// RateWindow
// ---------------------------------------------------------------------------

pub struct RateWindow {
    window: Duration,
    sources: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
}

impl RateWindow {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            sources: Mutex::new(HashMap::new()),
        }
    }

    /// Window from `anomaly_window_secs`, capped at [`MAX_ANOMALY_WINDOW_SECS`].
    pub fn from_config(config: &DetectionConfig) -> Self {
        let secs = config.anomaly_window_secs.min(MAX_ANOMALY_WINDOW_SECS);
        let window = i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or_else(Duration::zero);
        Self::new(window)
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record an arrival for `source` at `now`, prune everything that has
    /// aged out of the window, and return how many arrivals remain.
    pub async fn observe(&self, source: &str, now: DateTime<Utc>) -> usize {
        let mut sources = self.sources.lock().await;
        let arrivals = sources.entry(source.to_string()).or_default();
        arrivals.push_back(now);
        prune(arrivals, self.cutoff(now));
        arrivals.len()
    }

    /// Arrivals currently inside the window for `source`, without recording one.
    pub async fn count(&self, source: &str, now: DateTime<Utc>) -> usize {
        let mut sources = self.sources.lock().await;
        match sources.get_mut(source) {
            Some(arrivals) => {
                prune(arrivals, self.cutoff(now));
                arrivals.len()
            }
            None => 0,
        }
    }

    /// Drop sources with nothing left in the window. Returns how many were removed.
    pub async fn sweep(&self, now: DateTime<Utc>) -> usize {
        let cutoff = self.cutoff(now);
        let mut sources = self.sources.lock().await;
        let before = sources.len();
        sources.retain(|_, arrivals| {
            prune(arrivals, cutoff);
            !arrivals.is_empty()
        });
        before - sources.len()
    }

    pub async fn tracked_sources(&self) -> usize {
        self.sources.lock().await.len()
    }

    /// Oldest instant still inside the window. Saturates at the earliest
    /// representable time instead of overflowing.
    fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Periodically drop idle sources from `window`. Runs until the task is aborted.
pub async fn run_sweep_loop(window: Arc<RateWindow>, every: std::time::Duration) {
    info!(interval_secs = every.as_secs(), "rate window sweeper started");

    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        let removed = window.sweep(Utc::now()).await;
        if removed > 0 {
            debug!(removed, "swept idle sources from rate window");
        }
    }
}

/// Keep arrivals strictly newer than `cutoff`. Concurrent callers can insert
/// slightly out of order, so this filters the whole deque instead of popping
/// from the front.
fn prune(arrivals: &mut VecDeque<DateTime<Utc>>, cutoff: DateTime<Utc>) {
    arrivals.retain(|&t| t > cutoff);
}

// ---------------------------------------------------------------------------
// AnomalyDetector
// ---------------------------------------------------------------------------

pub struct AnomalyDetector {
    window: Arc<RateWindow>,
    threshold: usize,
}

impl AnomalyDetector {
    pub fn new(window: Arc<RateWindow>, threshold: usize) -> Self {
        Self { window, threshold }
    }
}

#[async_trait::async_trait]
impl Detector for AnomalyDetector {
    fn name(&self) -> &'static str {
        "anomaly"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::AnomalyDetection
    }

    async fn detect(
        &self,
        record: &Record,
        ctx: &DetectContext<'_>,
    ) -> Result<Vec<Finding>, DetectError> {
        let Some(source) = record.source_ip() else {
            return Ok(Vec::new());
        };

        let count = self.window.observe(&source, ctx.now).await;
        let window_secs = self.window.window().num_seconds();
        debug!(detector = self.name(), source = %source, count, "rate window updated");

        if count <= self.threshold {
            return Ok(Vec::new());
        }

        warn!(
            source = %source,
            count,
            window_secs,
            threshold = self.threshold,
            "request rate above threshold"
        );
        Ok(vec![Finding::new(
            ctx,
            record,
            FindingType::AnomalyDetected,
            Severity::High,
            ANOMALY_CONFIDENCE,
            DetectionMethod::AnomalyDetection,
            format!(
                "Anomalous activity: {} requests in {}s from {}",
                count, window_secs, source
            ),
        )])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
