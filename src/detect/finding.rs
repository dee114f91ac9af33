use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::detect::{DetectContext, DetectionMethod, FindingType, Record, Severity};

/// Hands out identifiers of the form `<prefix>_<counter>_<millis>`.
///
/// The counter is process-local; identifiers are unique for the lifetime of
/// the process, not across restarts.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: &'static str,
    counter: AtomicU64,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    /// Generator for finding ids (`threat_...`).
    pub fn new() -> Self {
        Self::with_prefix("threat")
    }

    pub fn with_prefix(prefix: &'static str) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }

    pub fn next_id(&self, at: DateTime<Utc>) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}_{}_{}", self.prefix, n, at.timestamp_millis())
    }

    /// Number of identifiers issued so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}

/// A single detected signal for one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub severity: Severity,
    pub confidence: f64,
    pub detection_method: DetectionMethod,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ip: Option<String>,
    /// The originating record, kept for audit only.
    #[serde(rename = "raw_data")]
    pub source_record: Record,
}

impl Finding {
    pub fn new(
        ctx: &DetectContext<'_>,
        record: &Record,
        finding_type: FindingType,
        severity: Severity,
        confidence: f64,
        detection_method: DetectionMethod,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: ctx.ids.next_id(ctx.now),
            finding_type,
            severity,
            confidence: confidence.clamp(0.0, 1.0),
            detection_method,
            description: description.into(),
            timestamp: ctx.now,
            field: None,
            pattern: None,
            port: None,
            source_ip: record.source_ip(),
            source_record: record.clone(),
        }
    }

    pub fn with_match(mut self, field: &str, pattern: &str) -> Self {
        self.field = Some(field.to_string());
        self.pattern = Some(pattern.to_string());
        self
    }

    pub fn with_port(mut self, port: i64) -> Self {
        self.port = Some(port);
        self
    }
}
