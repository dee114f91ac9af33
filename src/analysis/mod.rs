//! Analytics derived on demand from the findings ledger and the alert log.
//!
//! Nothing here holds state of its own: every snapshot is computed from a
//! consistent read of the store and its counters.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::MAX_RECENT_WINDOW_HOURS;
use crate::detect::{Finding, FindingType, Severity};
use crate::storage::{AggregateCounters, AlertCounts, AlertLog, FindingsLedger};

/// Reported in place of a real confidence average.
pub const AVG_CONFIDENCE_PLACEHOLDER: f64 = 0.75;

/// Trailing window for the "recent" alert count in [`StatsSnapshot`].
pub const RECENT_ALERT_WINDOW_HOURS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Period {
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub duration_hours: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAnalytics {
    pub total_threats: u64,
    /// Findings whose timestamp falls inside the period.
    pub threats_24h: u64,
    pub threats_by_severity: BTreeMap<Severity, u64>,
    pub threats_by_type: BTreeMap<FindingType, u64>,
    pub avg_confidence: f64,
    /// Mean confidence over the period; `None` when the period is empty.
    pub mean_confidence_24h: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealTimeMetrics {
    pub threats_per_hour: u64,
    pub threats_per_minute: u64,
    pub active_alerts: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSnapshot {
    pub period: Period,
    pub threat_analytics: ThreatAnalytics,
    pub real_time_metrics: RealTimeMetrics,
    pub last_updated: DateTime<Utc>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub total: u64,
    pub by_severity: BTreeMap<Severity, u64>,
    pub by_type: BTreeMap<FindingType, u64>,
    pub alerts: AlertCounts,
    pub timestamp: DateTime<Utc>,
}

/// Build an analytics snapshot for the `window_hours` ending at `now`.
///
/// The window is clamped to `1..=MAX_RECENT_WINDOW_HOURS`.
pub async fn snapshot(
    ledger: &FindingsLedger,
    alerts: &AlertLog,
    now: DateTime<Utc>,
    window_hours: i64,
) -> AnalyticsSnapshot {
    let active_alerts = alerts.len().await as u64;
    ledger
        .with_view(|findings, counters| {
            summarize(findings, counters, now, window_hours, active_alerts)
        })
        .await
}

pub async fn stats(
    ledger: &FindingsLedger,
    alerts: &AlertLog,
    now: DateTime<Utc>,
) -> StatsSnapshot {
    let counters = ledger.counters().await;
    let alerts = alerts
        .counts(now, Duration::hours(RECENT_ALERT_WINDOW_HOURS))
        .await;
    StatsSnapshot {
        total: counters.total,
        by_severity: counters.by_severity,
        by_type: counters.by_type,
        alerts,
        timestamp: now,
    }
}

fn summarize(
    findings: &[Finding],
    counters: &AggregateCounters,
    now: DateTime<Utc>,
    window_hours: i64,
    active_alerts: u64,
) -> AnalyticsSnapshot {
    let hours = window_hours.clamp(1, MAX_RECENT_WINDOW_HOURS);
    let start = Duration::try_hours(hours)
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let (recent, confidence_sum) = findings
        .iter()
        .filter(|f| f.timestamp > start && f.timestamp <= now)
        .fold((0u64, 0.0f64), |(n, sum), f| (n + 1, sum + f.confidence));

    let hours_u = hours as u64;
    AnalyticsSnapshot {
        period: Period {
            start_date: start,
            end_date: now,
            duration_hours: hours,
        },
        threat_analytics: ThreatAnalytics {
            total_threats: counters.total,
            threats_24h: recent,
            threats_by_severity: counters.by_severity.clone(),
            threats_by_type: counters.by_type.clone(),
            avg_confidence: AVG_CONFIDENCE_PLACEHOLDER,
            mean_confidence_24h: (recent > 0).then(|| confidence_sum / recent as f64),
        },
        real_time_metrics: RealTimeMetrics {
            threats_per_hour: recent / hours_u,
            threats_per_minute: recent / (hours_u * 60),
            active_alerts,
        },
        last_updated: counters.last_updated,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{DetectContext, DetectionMethod, IdGenerator, Record};
    use serde_json::json;

    fn finding_at(ids: &IdGenerator, at: DateTime<Utc>, confidence: f64) -> Finding {
        let ctx = DetectContext { now: at, ids };
        let record = Record::from_value(json!({"message": "x"})).unwrap();
        Finding::new(
            &ctx,
            &record,
            FindingType::AiDetectedThreat,
            Severity::Low,
            confidence,
            DetectionMethod::AiModel,
            "test",
        )
    }

    #[tokio::test]
    async fn test_recent_window_filters_by_timestamp() {
        let ids = IdGenerator::new();
        let ledger = FindingsLedger::new();
        let alerts = AlertLog::new();
        let now = Utc::now();

        ledger
            .record(vec![
                finding_at(&ids, now - Duration::hours(30), 0.5),
                finding_at(&ids, now - Duration::hours(2), 0.6),
                finding_at(&ids, now - Duration::minutes(5), 0.8),
            ])
            .await
            .unwrap();

        let snap = snapshot(&ledger, &alerts, now, 24).await;
        let threats = &snap.threat_analytics;
        assert_eq!(threats.total_threats, 3);
        assert_eq!(threats.threats_24h, 2);
        assert_eq!(threats.avg_confidence, 0.75);
        let mean = threats.mean_confidence_24h.unwrap();
        assert!((mean - 0.7).abs() < 1e-9);
        assert_eq!(snap.period.duration_hours, 24);
        assert_eq!(snap.period.end_date - snap.period.start_date, Duration::hours(24));
    }

    #[tokio::test]
    async fn test_rates_use_floor_division() {
        let ids = IdGenerator::new();
        let ledger = FindingsLedger::new();
        let now = Utc::now();

        let batch: Vec<Finding> = (0..1500)
            .map(|i| finding_at(&ids, now - Duration::seconds(i), 0.9))
            .collect();
        ledger.record(batch).await.unwrap();

        let snap = snapshot(&ledger, &AlertLog::new(), now, 24).await;
        assert_eq!(snap.threat_analytics.threats_24h, 1500);
        assert_eq!(snap.real_time_metrics.threats_per_hour, 62);
        assert_eq!(snap.real_time_metrics.threats_per_minute, 1);
    }

    #[tokio::test]
    async fn test_empty_ledger() {
        let ledger = FindingsLedger::new();
        let alerts = AlertLog::new();
        let now = Utc::now();
        let snap = snapshot(&ledger, &alerts, now, 24).await;
        assert_eq!(snap.threat_analytics.total_threats, 0);
        assert_eq!(snap.threat_analytics.threats_24h, 0);
        assert_eq!(snap.real_time_metrics.threats_per_minute, 0);
        assert_eq!(snap.real_time_metrics.active_alerts, 0);
        assert!(snap.threat_analytics.mean_confidence_24h.is_none());
        assert_eq!(snap.threat_analytics.threats_by_severity.len(), 4);

        let s = stats(&ledger, &alerts, now).await;
        assert_eq!(s.total, 0);
        assert!(s.by_type.is_empty());
        assert_eq!(s.alerts, AlertCounts { total: 0, recent: 0 });
    }

    #[tokio::test]
    async fn test_future_findings_excluded_from_window() {
        let ids = IdGenerator::new();
        let ledger = FindingsLedger::new();
        let now = Utc::now();
        ledger
            .append(finding_at(&ids, now + Duration::hours(1), 0.5))
            .await
            .unwrap();

        let snap = snapshot(&ledger, &AlertLog::new(), now, 24).await;
        assert_eq!(snap.threat_analytics.total_threats, 1);
        assert_eq!(snap.threat_analytics.threats_24h, 0);
    }

    #[tokio::test]
    async fn test_oversized_window_is_clamped() {
        let ids = IdGenerator::new();
        let ledger = FindingsLedger::new();
        let now = Utc::now();
        ledger
            .append(finding_at(&ids, now - Duration::days(30), 0.5))
            .await
            .unwrap();

        let snap = snapshot(&ledger, &AlertLog::new(), now, 9_000_000_000_000_000).await;
        assert_eq!(snap.period.duration_hours, MAX_RECENT_WINDOW_HOURS);
        assert_eq!(snap.threat_analytics.threats_24h, 1);

        let early = DateTime::<Utc>::MIN_UTC + Duration::hours(2);
        let snap = snapshot(&ledger, &AlertLog::new(), early, 24).await;
        assert_eq!(snap.period.start_date, DateTime::<Utc>::MIN_UTC);
    }

    #[tokio::test]
    async fn test_alerts_feed_metrics_and_stats() {
        let ledger = FindingsLedger::new();
        let alerts = AlertLog::new();
        let now = Utc::now();
        alerts
            .raise_config_update(json!({"a": 1}), now - Duration::hours(2))
            .await;
        alerts.raise_config_update(json!({"a": 2}), now).await;

        let snap = snapshot(&ledger, &alerts, now, 24).await;
        assert_eq!(snap.real_time_metrics.active_alerts, 2);

        let s = stats(&ledger, &alerts, now).await;
        assert_eq!(s.alerts, AlertCounts { total: 2, recent: 1 });
    }
}
