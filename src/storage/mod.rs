//! In-memory findings store and the aggregate counters kept alongside it.
//!
//! The store and its counters are one consistency unit behind a single
//! `tokio::sync::RwLock`: every mutation takes the write lock for the whole
//! read-counters / mutate / write-counters sequence, and readers see either
//! the state before or after it, never in between.

pub mod alerts;

pub use self::alerts::{Alert, AlertCounts, AlertLog, DEFAULT_ALERT_LIMIT};

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use crate::detect::{Finding, FindingType, Severity};

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("finding not found: {0}")]
    NotFound(String),
    #[error("duplicate finding id: {0}")]
    DuplicateId(String),
    #[error("counter invariant violated: {0}")]
    InvariantViolation(String),
}

/// Running tallies over every finding currently in the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateCounters {
    pub total: u64,
    pub by_severity: BTreeMap<Severity, u64>,
    pub by_type: BTreeMap<FindingType, u64>,
    pub last_updated: DateTime<Utc>,
}

impl AggregateCounters {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            total: 0,
            by_severity: Severity::ALL.iter().map(|s| (*s, 0)).collect(),
            by_type: BTreeMap::new(),
            last_updated: now,
        }
    }

    fn add(&mut self, finding: &Finding, now: DateTime<Utc>) {
        self.total += 1;
        *self.by_severity.entry(finding.severity).or_insert(0) += 1;
        *self.by_type.entry(finding.finding_type).or_insert(0) += 1;
        self.last_updated = now;
    }

    fn subtract(&mut self, finding: &Finding, now: DateTime<Utc>) {
        self.total = self.total.saturating_sub(1);
        if let Some(n) = self.by_severity.get_mut(&finding.severity) {
            *n = n.saturating_sub(1);
        }
        if let Some(n) = self.by_type.get_mut(&finding.finding_type) {
            *n = n.saturating_sub(1);
        }
        self.last_updated = now;
    }
}

struct LedgerInner {
    findings: Vec<Finding>,
    ids: HashSet<String>,
    counters: AggregateCounters,
}

impl LedgerInner {
    /// Check the counters against the store contents.
    fn verify(&self) -> Result<(), StoreError> {
        let len = self.findings.len() as u64;
        if self.counters.total != len {
            return Err(StoreError::InvariantViolation(format!(
                "total {} != store size {}",
                self.counters.total, len
            )));
        }
        let severity_sum: u64 = self.counters.by_severity.values().sum();
        if severity_sum != len {
            return Err(StoreError::InvariantViolation(format!(
                "severity tallies sum to {} but store holds {}",
                severity_sum, len
            )));
        }
        let type_sum: u64 = self.counters.by_type.values().sum();
        if type_sum != len {
            return Err(StoreError::InvariantViolation(format!(
                "type tallies sum to {} but store holds {}",
                type_sum, len
            )));
        }
        Ok(())
    }
}

/// The findings store plus its aggregate counters.
pub struct FindingsLedger {
    inner: RwLock<LedgerInner>,
}

impl Default for FindingsLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl FindingsLedger {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(LedgerInner {
                findings: Vec::new(),
                ids: HashSet::new(),
                counters: AggregateCounters::new(Utc::now()),
            }),
        }
    }

    pub async fn append(&self, finding: Finding) -> Result<(), StoreError> {
        self.record(vec![finding]).await.map(|_| ())
    }

    /// Append a batch of findings in order, all or nothing.
    ///
    /// Returns the store size after the batch.
    pub async fn record(&self, findings: Vec<Finding>) -> Result<usize, StoreError> {
        let mut inner = self.inner.write().await;

        let mut batch_ids = HashSet::with_capacity(findings.len());
        for f in &findings {
            if inner.ids.contains(&f.id) || !batch_ids.insert(f.id.as_str()) {
                return Err(StoreError::DuplicateId(f.id.clone()));
            }
        }
        drop(batch_ids);

        let now = Utc::now();
        let added = findings.len();
        for f in findings {
            inner.counters.add(&f, now);
            inner.ids.insert(f.id.clone());
            inner.findings.push(f);
        }

        fail_loudly(inner.verify())?;
        debug!(added, total = inner.findings.len(), "findings recorded");
        Ok(inner.findings.len())
    }

    /// Remove the finding with identifier `id`. Returns it together with the
    /// store size right after the removal.
    pub async fn remove(&self, id: &str) -> Result<(Finding, usize), StoreError> {
        let mut inner = self.inner.write().await;

        if !inner.ids.contains(id) {
            return Err(StoreError::NotFound(id.to_string()));
        }
        let pos = inner
            .findings
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| {
                StoreError::InvariantViolation(format!("id {} indexed but not stored", id))
            });
        let pos = fail_loudly(pos)?;

        let removed = inner.findings.remove(pos);
        inner.ids.remove(id);
        inner.counters.subtract(&removed, Utc::now());

        fail_loudly(inner.verify())?;
        let remaining = inner.findings.len();
        info!(id = %removed.id, remaining, "finding deleted");
        Ok((removed, remaining))
    }

    /// All findings in insertion order.
    pub async fn list(&self) -> Vec<Finding> {
        self.inner.read().await.findings.clone()
    }

    /// The most recent `limit` findings, oldest first.
    pub async fn list_recent(&self, limit: usize) -> Vec<Finding> {
        let inner = self.inner.read().await;
        let start = inner.findings.len().saturating_sub(limit);
        inner.findings[start..].to_vec()
    }

    /// The most recent `limit` findings (all of them when `None`) plus the
    /// store size, from one read of the store.
    pub async fn list_with_total(&self, limit: Option<usize>) -> (Vec<Finding>, usize) {
        let inner = self.inner.read().await;
        let len = inner.findings.len();
        let start = limit.map_or(0, |l| len.saturating_sub(l));
        (inner.findings[start..].to_vec(), len)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.findings.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn counters(&self) -> AggregateCounters {
        self.inner.read().await.counters.clone()
    }

    /// Run `f` over a consistent view of the store and counters under the
    /// shared lock.
    pub async fn with_view<R>(&self, f: impl FnOnce(&[Finding], &AggregateCounters) -> R) -> R {
        let inner = self.inner.read().await;
        f(&inner.findings, &inner.counters)
    }
}

fn fail_loudly<T>(result: Result<T, StoreError>) -> Result<T, StoreError> {
    if let Err(e) = &result {
        error!(error = %e, "findings ledger is inconsistent");
        if cfg!(debug_assertions) {
            panic!("findings ledger is inconsistent: {e}");
        }
    }
    result
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
