//! TOML configuration for threatlens.
//!
//! Layered lookup: explicit path, then the `THREATLENS_CONFIG` environment
//! variable, then `/etc/threatlens/threatlens.toml`, then compiled-in defaults.

use std::path::Path;

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

pub const CONFIG_ENV: &str = "THREATLENS_CONFIG";
pub const SYSTEM_CONFIG_PATH: &str = "/etc/threatlens/threatlens.toml";

/// Longest accepted rate window: one year.
pub const MAX_ANOMALY_WINDOW_SECS: u64 = 86_400 * 365;
/// Longest accepted analytics window: one leap year.
pub const MAX_RECENT_WINDOW_HOURS: i64 = 24 * 366;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreatLensConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ThreatLensConfig {
    /// Load and validate configuration from a TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config file: {}", path.display()))?;
        info!(path = %path.display(), "loaded threatlens configuration");
        Ok(config)
    }

    /// Resolve configuration. An explicit path must load; the environment and
    /// system locations fall through to defaults on failure.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        Ok(Self::load_or_default())
    }

    pub fn load_or_default() -> Self {
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = Path::new(&env_path);
            match Self::load(path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "THREATLENS_CONFIG set but file could not be loaded, trying fallback"
                    );
                }
            }
        }

        let system_path = Path::new(SYSTEM_CONFIG_PATH);
        if system_path.exists() {
            match Self::load(system_path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    warn!(
                        path = %system_path.display(),
                        error = %e,
                        "system config file exists but could not be loaded, using defaults"
                    );
                }
            }
        }

        debug!("no config file found, using compiled-in defaults");
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        self.detection.validate()?;
        ensure!(
            self.analytics.recent_window_hours > 0,
            "analytics.recent_window_hours must be positive"
        );
        ensure!(
            self.analytics.recent_window_hours <= MAX_RECENT_WINDOW_HOURS,
            "analytics.recent_window_hours must be at most {}, got {}",
            MAX_RECENT_WINDOW_HOURS,
            self.analytics.recent_window_hours
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Address and port for the HTTP listener.
    pub listen_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_address: "0.0.0.0:5000".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Substrings the pattern detector looks for: injection markers, shell
/// metacharacters and commands, traversal sequences, SSRF schemes.
pub const DEFAULT_PATTERNS: &[&str] = &[
    "sql injection",
    "sqlmap",
    "xss",
    "command injection",
    "path traversal",
    "buffer overflow",
    "privilege escalation",
    "brute force",
    "ddos",
    "script",
    "alert",
    "union select",
    "drop table",
    "insert into",
    ";",
    "&&",
    "|",
    "wget",
    "curl",
    "python",
    "bash",
    "sh",
    "../",
    "/etc/passwd",
    "boot.ini",
    "http://169.254.169.254",
    "file://",
    "gopher://",
];

pub const DEFAULT_SUSPICIOUS_PORTS: &[i64] = &[22, 23, 3389, 445, 1433, 3306, 5432];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Pattern vocabulary, matched case-insensitively.
    pub patterns: Vec<String>,
    pub suspicious_ports: Vec<i64>,
    /// Substring in `message` that makes the static model flag a record.
    pub model_trigger: String,
    /// Trailing window for the per-source rate tracker (seconds).
    pub anomaly_window_secs: u64,
    /// A source is anomalous once its window holds more than this many records.
    pub anomaly_threshold: usize,
    /// Per-record emission probability of the stochastic scorer.
    pub stochastic_probability: f64,
    /// Fixed seed for the stochastic scorer; entropy-seeded when absent.
    pub stochastic_seed: Option<u64>,
    /// How often idle sources are swept out of the rate window (seconds).
    pub window_sweep_interval_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect(),
            suspicious_ports: DEFAULT_SUSPICIOUS_PORTS.to_vec(),
            model_trigger: "exploit".to_string(),
            anomaly_window_secs: 60,
            anomaly_threshold: 10,
            stochastic_probability: 0.3,
            stochastic_seed: None,
            window_sweep_interval_secs: 300,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (0.0..=1.0).contains(&self.stochastic_probability),
            "detection.stochastic_probability must be within [0, 1], got {}",
            self.stochastic_probability
        );
        ensure!(
            self.anomaly_window_secs > 0,
            "detection.anomaly_window_secs must be positive"
        );
        ensure!(
            self.anomaly_window_secs <= MAX_ANOMALY_WINDOW_SECS,
            "detection.anomaly_window_secs must be at most {}, got {}",
            MAX_ANOMALY_WINDOW_SECS,
            self.anomaly_window_secs
        );
        ensure!(
            self.anomaly_threshold > 0,
            "detection.anomaly_threshold must be positive"
        );
        ensure!(
            self.window_sweep_interval_secs > 0,
            "detection.window_sweep_interval_secs must be positive"
        );
        ensure!(
            self.patterns.iter().all(|p| !p.is_empty()),
            "detection.patterns must not contain empty entries"
        );
        ensure!(
            !self.model_trigger.is_empty(),
            "detection.model_trigger must not be empty"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Analytics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Length of the trailing window for the "recent threats" count.
    pub recent_window_hours: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            recent_window_hours: 24,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Minimum tracing level (`trace`, `debug`, `info`, `warn`, `error`).
    pub level: String,
    /// Emit JSON-formatted log lines instead of the human format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
