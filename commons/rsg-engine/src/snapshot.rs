//! Derived cluster health produced by one aggregation cycle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::{SourceKind, SourcePayload};

/// Percentage at or above which a cluster that is not fully healthy still
/// holds quorum.
pub const DEGRADED_THRESHOLD: f64 = 66.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeRole {
    Primary,
    Secondary,
    Unknown,
}

impl NodeRole {
    pub fn parse(state: &str) -> Self {
        match state.trim().to_ascii_uppercase().as_str() {
            "PRIMARY" => NodeRole::Primary,
            "SECONDARY" => NodeRole::Secondary,
            _ => NodeRole::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Liveness {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuorumState {
    Healthy,
    Degraded,
    Critical,
}

impl QuorumState {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 100.0 {
            QuorumState::Healthy
        } else if percentage >= DEGRADED_THRESHOLD {
            QuorumState::Degraded
        } else {
            QuorumState::Critical
        }
    }

    pub fn holds_quorum(&self) -> bool {
        !matches!(self, QuorumState::Critical)
    }
}

impl std::fmt::Display for QuorumState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QuorumState::Healthy => "HEALTHY",
            QuorumState::Degraded => "DEGRADED",
            QuorumState::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    pub address: String,
    pub role: NodeRole,
    pub liveness: Liveness,
    pub uptime_secs: u64,
}

impl NodeRecord {
    pub fn new(name: impl Into<String>, role: NodeRole, liveness: Liveness) -> Self {
        let name = name.into();
        Self {
            address: name.clone(),
            name,
            role,
            liveness,
            uptime_secs: 0,
        }
    }

    pub fn is_up(&self) -> bool {
        self.liveness == Liveness::Up
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeLag {
    pub node: String,
    pub lag_secs: f64,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationSummary {
    pub max_lag_secs: f64,
    pub overall_status: String,
    pub lag: Vec<NodeLag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoverySummary {
    pub nodes_needing_recovery: u32,
    pub recovery_required: bool,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionLogSummary {
    pub total_operations: u64,
    pub by_result: BTreeMap<String, u64>,
}

/// Freshness of one configured source as of the cycle that produced the
/// snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceStatus {
    pub name: String,
    pub kind: SourceKind,
    pub fresh: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl SourceStatus {
    pub fn new(name: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            fresh: false,
            last_success: None,
            last_error: None,
        }
    }
}

/// Immutable health picture. A new value supersedes the previous one every
/// cycle; consumers hold it behind an `Arc`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    cycle: u64,
    taken_at: DateTime<Utc>,
    total_nodes: usize,
    healthy_nodes: usize,
    health_percentage: f64,
    quorum: QuorumState,
    primary_count: usize,
    split_brain: bool,
    nodes: Vec<NodeRecord>,
    replication: Option<ReplicationSummary>,
    recovery: Option<RecoverySummary>,
    transaction_log: Option<TransactionLogSummary>,
    sources: Vec<SourceStatus>,
}

impl HealthSnapshot {
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn total_nodes(&self) -> usize {
        self.total_nodes
    }

    pub fn healthy_nodes(&self) -> usize {
        self.healthy_nodes
    }

    pub fn health_percentage(&self) -> f64 {
        self.health_percentage
    }

    pub fn quorum(&self) -> QuorumState {
        self.quorum
    }

    pub fn primary_count(&self) -> usize {
        self.primary_count
    }

    /// More than one node claims the PRIMARY role.
    pub fn split_brain(&self) -> bool {
        self.split_brain
    }

    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    pub fn node(&self, name: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn replication(&self) -> Option<&ReplicationSummary> {
        self.replication.as_ref()
    }

    pub fn recovery(&self) -> Option<&RecoverySummary> {
        self.recovery.as_ref()
    }

    pub fn transaction_log(&self) -> Option<&TransactionLogSummary> {
        self.transaction_log.as_ref()
    }

    pub fn sources(&self) -> &[SourceStatus] {
        &self.sources
    }

    pub fn stale_sources(&self) -> usize {
        self.sources.iter().filter(|s| !s.fresh).count()
    }

    /// Share of configured sources that answered in this cycle.
    pub fn confidence(&self) -> f64 {
        if self.sources.is_empty() {
            return 1.0;
        }
        let fresh = self.sources.len() - self.stale_sources();
        fresh as f64 / self.sources.len() as f64
    }
}

pub struct SnapshotBuilder {
    cycle: u64,
    taken_at: DateTime<Utc>,
    nodes: Vec<NodeRecord>,
    replication: Option<ReplicationSummary>,
    recovery: Option<RecoverySummary>,
    transaction_log: Option<TransactionLogSummary>,
    sources: Vec<SourceStatus>,
}

impl SnapshotBuilder {
    pub fn new(cycle: u64) -> Self {
        Self {
            cycle,
            taken_at: Utc::now(),
            nodes: Vec::new(),
            replication: None,
            recovery: None,
            transaction_log: None,
            sources: Vec::new(),
        }
    }

    pub fn with_nodes(mut self, nodes: Vec<NodeRecord>) -> Self {
        self.merge_membership(nodes);
        self
    }

    /// Later records for an already known node name replace earlier ones.
    pub fn merge_membership(&mut self, nodes: Vec<NodeRecord>) {
        for node in nodes {
            match self.nodes.iter_mut().find(|n| n.name == node.name) {
                Some(existing) => *existing = node,
                None => self.nodes.push(node),
            }
        }
    }

    pub fn merge(&mut self, payload: SourcePayload) {
        match payload {
            SourcePayload::Membership(nodes) => self.merge_membership(nodes),
            SourcePayload::Replication(r) => self.replication = Some(r),
            SourcePayload::Recovery(r) => self.recovery = Some(r),
            SourcePayload::TransactionLog(t) => self.transaction_log = Some(t),
        }
    }

    pub fn source(&mut self, status: SourceStatus) {
        self.sources.push(status);
    }

    pub fn build(self) -> HealthSnapshot {
        let total_nodes = self.nodes.len();
        let healthy_nodes = self.nodes.iter().filter(|n| n.is_up()).count();
        let health_percentage = if total_nodes == 0 {
            0.0
        } else {
            100.0 * healthy_nodes as f64 / total_nodes as f64
        };
        let quorum = if total_nodes > 0 && healthy_nodes == total_nodes {
            QuorumState::Healthy
        } else {
            QuorumState::from_percentage(health_percentage)
        };
        let primary_count = self
            .nodes
            .iter()
            .filter(|n| n.is_up() && n.role == NodeRole::Primary)
            .count();
        HealthSnapshot {
            cycle: self.cycle,
            taken_at: self.taken_at,
            total_nodes,
            healthy_nodes,
            health_percentage,
            quorum,
            primary_count,
            split_brain: primary_count > 1,
            nodes: self.nodes,
            replication: self.replication,
            recovery: self.recovery,
            transaction_log: self.transaction_log,
            sources: self.sources,
        }
    }
}
