//! Model-backed detectors.
//!
//! Neither of these is a learned model. [`StaticModelDetector`] is a fixed
//! rule standing in for a binary classifier, and [`StochasticDetector`] is a
//! seeded random scorer standing in for a probabilistic one. A real model
//! replaces either one by implementing [`Detector`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::DetectionConfig;
use crate::detect::{
    DetectContext, DetectError, DetectionMethod, Detector, Finding, FindingType, Record, Severity,
};

const MODEL_CONFIDENCE: f64 = 0.8;
const STOCHASTIC_SEVERITIES: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];
const STOCHASTIC_CONFIDENCE_MIN: f64 = 0.5;
const STOCHASTIC_CONFIDENCE_MAX: f64 = 0.95;

/// A binary decision with the confidence it was made at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verdict {
    pub malicious: bool,
    pub confidence: f64,
}

pub struct StaticModelDetector {
    suspicious_ports: Vec<i64>,
    trigger: String,
}

impl StaticModelDetector {
    pub fn new(suspicious_ports: impl Into<Vec<i64>>, trigger: &str) -> Self {
        Self {
            suspicious_ports: suspicious_ports.into(),
            trigger: trigger.to_lowercase(),
        }
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        Self::new(config.suspicious_ports.clone(), &config.model_trigger)
    }

    pub fn predict(&self, record: &Record) -> Verdict {
        let port_hit = record
            .port()
            .is_some_and(|p| self.suspicious_ports.contains(&p));
        let message_hit = record
            .text("message")
            .is_some_and(|m| m.to_lowercase().contains(&self.trigger));

        Verdict {
            malicious: port_hit || message_hit,
            confidence: MODEL_CONFIDENCE,
        }
    }
}

#[async_trait::async_trait]
impl Detector for StaticModelDetector {
    fn name(&self) -> &'static str {
        "static_model"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::MlModel
    }

    async fn detect(
        &self,
        record: &Record,
        ctx: &DetectContext<'_>,
    ) -> Result<Vec<Finding>, DetectError> {
        let verdict = self.predict(record);
        if !verdict.malicious {
            return Ok(Vec::new());
        }

        debug!(detector = self.name(), confidence = verdict.confidence, "model flagged record");
        Ok(vec![Finding::new(
            ctx,
            record,
            FindingType::MlDetectedThreat,
            Severity::Medium,
            verdict.confidence,
            DetectionMethod::MlModel,
            "ML model flagged this as potentially malicious",
        )])
    }
}

pub struct StochasticDetector {
    probability: f64,
    rng: Mutex<StdRng>,
}

impl StochasticDetector {
    pub fn new(probability: f64, rng: StdRng) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: Mutex::new(rng),
        }
    }

    pub fn seeded(probability: f64, seed: u64) -> Self {
        Self::new(probability, StdRng::seed_from_u64(seed))
    }

    pub fn from_config(config: &DetectionConfig) -> Self {
        let rng = match config.stochastic_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::new(config.stochastic_probability, rng)
    }
}

#[async_trait::async_trait]
impl Detector for StochasticDetector {
    fn name(&self) -> &'static str {
        "stochastic"
    }

    fn method(&self) -> DetectionMethod {
        DetectionMethod::AiModel
    }

    async fn detect(
        &self,
        record: &Record,
        ctx: &DetectContext<'_>,
    ) -> Result<Vec<Finding>, DetectError> {
        let (severity, confidence) = {
            let mut rng = self.rng.lock().await;
            if rng.gen::<f64>() >= self.probability {
                return Ok(Vec::new());
            }
            let severity = STOCHASTIC_SEVERITIES[rng.gen_range(0..STOCHASTIC_SEVERITIES.len())];
            let confidence =
                rng.gen_range(STOCHASTIC_CONFIDENCE_MIN..=STOCHASTIC_CONFIDENCE_MAX);
            // Two decimals, as reported to clients.
            (severity, (confidence * 100.0).round() / 100.0)
        };

        Ok(vec![Finding::new(
            ctx,
            record,
            FindingType::AiDetectedThreat,
            severity,
            confidence,
            DetectionMethod::AiModel,
            "AI model detected potential threat",
        )])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::IdGenerator;
    use chrono::Utc;
    use serde_json::json;

    fn record(v: serde_json::Value) -> Record {
        Record::from_value(v).unwrap()
    }

    #[test]
    fn test_static_model_rule() {
        let model = StaticModelDetector::from_config(&DetectionConfig::default());

        assert!(model.predict(&record(json!({"port": 22}))).malicious);
        assert!(model.predict(&record(json!({"message": "Remote EXPLOIT attempt"}))).malicious);
        assert!(!model.predict(&record(json!({"port": 80, "message": "hello"}))).malicious);
        assert_eq!(model.predict(&record(json!({"port": 22}))).confidence, 0.8);
    }

    #[tokio::test]
    async fn test_static_model_finding() {
        let model = StaticModelDetector::from_config(&DetectionConfig::default());
        let ids = IdGenerator::new();
        let ctx = DetectContext { now: Utc::now(), ids: &ids };

        let findings = model.detect(&record(json!({"port": 5432})), &ctx).await.unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].finding_type, FindingType::MlDetectedThreat);
        assert_eq!(findings[0].severity, Severity::Medium);
        assert_eq!(findings[0].detection_method, DetectionMethod::MlModel);
    }

    #[tokio::test]
    async fn test_stochastic_extremes() {
        let ids = IdGenerator::new();
        let ctx = DetectContext { now: Utc::now(), ids: &ids };
        let r = record(json!({"message": "x"}));

        let never = StochasticDetector::seeded(0.0, 1);
        let always = StochasticDetector::seeded(1.0, 1);
        for _ in 0..50 {
            assert!(never.detect(&r, &ctx).await.unwrap().is_empty());

            let hit = always.detect(&r, &ctx).await.unwrap();
            assert_eq!(hit.len(), 1);
            let f = &hit[0];
            assert_eq!(f.finding_type, FindingType::AiDetectedThreat);
            assert!(STOCHASTIC_SEVERITIES.contains(&f.severity));
            assert!((0.5..=0.95).contains(&f.confidence));
        }
    }

    #[tokio::test]
    async fn test_stochastic_is_reproducible_with_seed() {
        let ids = IdGenerator::new();
        let ctx = DetectContext { now: Utc::now(), ids: &ids };
        let r = record(json!({"message": "x"}));

        let a = StochasticDetector::seeded(0.3, 7);
        let b = StochasticDetector::seeded(0.3, 7);
        let mut hits = 0;
        for _ in 0..200 {
            let fa = a.detect(&r, &ctx).await.unwrap();
            let fb = b.detect(&r, &ctx).await.unwrap();
            assert_eq!(fa.len(), fb.len());
            if let (Some(x), Some(y)) = (fa.first(), fb.first()) {
                assert_eq!(x.severity, y.severity);
                assert_eq!(x.confidence, y.confidence);
                hits += 1;
            }
        }
        // 200 draws at p = 0.3; anything outside this band means the rate is wrong.
        assert!(hits > 20 && hits < 110, "unexpected hit count {hits}");
    }
}
