//! Bounded, most-recent-first records for display.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::catalog::RiskLevel;
use crate::snapshot::QuorumState;

pub const DEFAULT_CAPACITY: usize = 10;

pub struct HistoryLedger<T> {
    capacity: usize,
    entries: RwLock<VecDeque<T>>,
}

impl<T: Clone> HistoryLedger<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Inserts at the front, dropping the oldest entries beyond capacity.
    pub async fn append(&self, entry: T) {
        let mut entries = self.entries.write().await;
        entries.push_front(entry);
        entries.truncate(self.capacity);
    }

    pub async fn recent(&self) -> Vec<T> {
        self.entries.read().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl<T: Clone> Default for HistoryLedger<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunOutcome {
    Succeeded,
    Failed { stage: Option<usize>, reason: String },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

/// One completed scenario run.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub run_id: u64,
    pub scenario_id: String,
    pub name: String,
    pub risk: RiskLevel,
    pub started_at: DateTime<Utc>,
    /// Nominal scenario duration.
    pub duration_secs: u64,
    pub elapsed_ms: u64,
    pub outcome: RunOutcome,
    pub recovery_estimate_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationRecord {
    pub at: DateTime<Utc>,
    pub collection: String,
    pub durability: String,
    pub is_safe: bool,
    pub can_execute: bool,
    pub warnings: usize,
}

/// Recorded whenever the derived quorum state, the split-brain signal or the
/// recovery status changes between published snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckRecord {
    pub at: DateTime<Utc>,
    pub cycle: u64,
    pub previous: Option<QuorumState>,
    pub quorum: QuorumState,
    pub healthy_nodes: usize,
    pub total_nodes: usize,
    pub health_percentage: f64,
    pub split_brain: bool,
    /// `None` while no recovery source has answered.
    pub recovery_required: Option<bool>,
    pub nodes_needing_recovery: Option<u32>,
}

#[derive(Clone)]
pub struct Ledgers {
    pub scenarios: Arc<HistoryLedger<HistoryEntry>>,
    pub validations: Arc<HistoryLedger<ValidationRecord>>,
    pub checks: Arc<HistoryLedger<HealthCheckRecord>>,
}

impl Ledgers {
    pub fn new(capacity: usize) -> Self {
        Self {
            scenarios: Arc::new(HistoryLedger::new(capacity)),
            validations: Arc::new(HistoryLedger::new(capacity)),
            checks: Arc::new(HistoryLedger::new(capacity)),
        }
    }
}
