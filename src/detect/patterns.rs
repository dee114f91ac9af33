//! Signature detectors: substring patterns over request fields and the
//! suspicious-port check.

use tracing::debug;

use crate::config::DetectionConfig;
use crate::detect::{
    DetectContext, DetectError, DetectionMethod, Detector, Finding, FindingType, Record, Severity,
};

/// Record fields the pattern detector inspects, in scan order.
pub const SCANNED_FIELDS: &[&str] = &["user_agent", "request_method", "message", "url"];

const PATTERN_CONFIDENCE: f64 = 0.9;
const PORT_CONFIDENCE: f64 = 0.7;

pub struct PatternDetector {
    /// Lowercased vocabulary, in configured order.
    patterns: Vec<String>,
}

impl PatternDetector {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.as_ref().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(&config.patterns)
    }

    /// Every (field, pattern) pair that matches, in field then vocabulary order.
    pub fn matches<'a>(&'a self, record: &Record) -> Vec<(&'static str, &'a str)> {
        let mut hits = Vec::new();
        for &field in SCANNED_FIELDS {
            let Some(value) = record.text(field) else {
                continue;
            };
            let value = value.to_lowercase();
            for pattern in &self.patterns {
                if value.contains(pattern.as_str()) {
                    hits.push((field, pattern.as_str()));
                }
            }
        }
        hits
    }
}

#[async_trait::async_trait]
impl Detector for PatternDetector {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::PatternMatching
    }

    async fn detect(
        &self,
        record: &Record,
        ctx: &DetectContext<'_>,
    ) -> Result<Vec<Finding>, DetectError> {
        let findings: Vec<Finding> = self
            .matches(record)
            .into_iter()
            .map(|(field, pattern)| {
                Finding::new(
                    ctx,
                    record,
                    FindingType::SuspiciousPattern,
                    Severity::High,
                    PATTERN_CONFIDENCE,
                    DetectionMethod::PatternMatching,
                    format!("Suspicious pattern '{}' detected in {}", pattern, field),
                )
                .with_match(field, pattern)
            })
            .collect();

        if !findings.is_empty() {
            debug!(detector = self.name(), hits = findings.len(), "pattern matches");
        }
        Ok(findings)
    }
}

pub struct PortDetector {
    ports: Vec<i64>,
}

impl PortDetector {
    pub fn new(ports: impl Into<Vec<i64>>) -> Self {
        Self { ports: ports.into() }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.suspicious_ports.clone())
    }

    pub fn is_suspicious(&self, port: i64) -> bool {
        self.ports.contains(&port)
    }
}

#[async_trait::async_trait]
impl Detector for PortDetector {
    fn name(&self) -> &'static str {
        "port"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::PortAnalysis
    }

    async fn detect(
        &self,
        record: &Record,
        ctx: &DetectContext<'_>,
    ) -> Result<Vec<Finding>, DetectError> {
        let Some(port) = record.port().filter(|p| self.is_suspicious(*p)) else {
            return Ok(Vec::new());
        };

        debug!(detector = self.name(), port, "suspicious port");
        Ok(vec![Finding::new(
            ctx,
            record,
            FindingType::SuspiciousPort,
            Severity::Medium,
            PORT_CONFIDENCE,
            DetectionMethod::PortAnalysis,
            format!("Suspicious port {} detected", port),
        )
        .with_port(port)])
    }
}
