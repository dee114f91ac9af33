//! Alert log: configuration-update alerts raised through the API, kept in
//! arrival order behind their own lock, separate from the findings ledger.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

use crate::detect::IdGenerator;

/// How many alerts a listing returns when the caller gives no limit.
pub const DEFAULT_ALERT_LIMIT: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    ConfigurationUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub severity: AlertLevel,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    /// The alert settings exactly as the caller posted them.
    pub config: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertCounts {
    pub total: u64,
    /// Alerts raised inside the trailing window passed to [`AlertLog::counts`].
    pub recent: u64,
}

pub struct AlertLog {
    alerts: RwLock<Vec<Alert>>,
    ids: IdGenerator,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertLog {
    pub fn new() -> Self {
        Self {
            alerts: RwLock::new(Vec::new()),
            ids: IdGenerator::with_prefix("alert"),
        }
    }

    /// Record a configuration update and return the alert that was logged.
    pub async fn raise_config_update(&self, config: Value, now: DateTime<Utc>) -> Alert {
        let alert = Alert {
            id: self.ids.next_id(now),
            alert_type: AlertType::ConfigurationUpdate,
            severity: AlertLevel::Info,
            description: "Alert configuration updated".to_string(),
            timestamp: now,
            config,
        };

        let mut alerts = self.alerts.write().await;
        alerts.push(alert.clone());
        info!(id = %alert.id, total = alerts.len(), "alert configuration updated");
        alert
    }

    /// The most recent `limit` alerts, oldest first.
    pub async fn list_recent(&self, limit: usize) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        let start = alerts.len().saturating_sub(limit);
        alerts[start..].to_vec()
    }

    pub async fn len(&self) -> usize {
        self.alerts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Total alerts plus those newer than `now - within`.
    pub async fn counts(&self, now: DateTime<Utc>, within: Duration) -> AlertCounts {
        let cutoff = now
            .checked_sub_signed(within)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let alerts = self.alerts.read().await;
        AlertCounts {
            total: alerts.len() as u64,
            recent: alerts.iter().filter(|a| a.timestamp > cutoff).count() as u64,
        }
    }
}
