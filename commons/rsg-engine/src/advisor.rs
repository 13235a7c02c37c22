use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::aggregator::SnapshotWatch;
use crate::error::ValidationError;
use crate::history::{HistoryLedger, ValidationRecord};
use crate::snapshot::{HealthSnapshot, QuorumState};

/// Acknowledgment requirement declared for a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityLevel {
    Majority,
    All,
    Nodes(u32),
    /// Store default; one acknowledgment.
    Default,
}

impl DurabilityLevel {
    /// Only ever acknowledged by a single node (or none).
    pub fn is_single_node(&self) -> bool {
        matches!(
            self,
            DurabilityLevel::Default | DurabilityLevel::Nodes(0) | DurabilityLevel::Nodes(1)
        )
    }
}

impl FromStr for DurabilityLevel {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        match value.to_ascii_lowercase().as_str() {
            "majority" => Ok(DurabilityLevel::Majority),
            "all" => Ok(DurabilityLevel::All),
            "default" => Ok(DurabilityLevel::Default),
            other => other
                .parse::<u32>()
                .map(DurabilityLevel::Nodes)
                .map_err(|_| ValidationError::UnknownDurability(value.to_string())),
        }
    }
}

impl Display for DurabilityLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DurabilityLevel::Majority => f.write_str("majority"),
            DurabilityLevel::All => f.write_str("all"),
            DurabilityLevel::Nodes(n) => write!(f, "{n}"),
            DurabilityLevel::Default => f.write_str("default"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRequest {
    pub collection: String,
    /// Raw JSON text of the proposed document.
    pub document: String,
    pub durability: String,
}

/// The slice of the snapshot a verdict was based on.
#[derive(Debug, Clone, Serialize)]
pub struct ClusterHealth {
    pub cycle: u64,
    pub total_nodes: usize,
    pub healthy_nodes: usize,
    pub primary_nodes: usize,
    pub health_percentage: f64,
    pub quorum: QuorumState,
    pub stale_sources: usize,
}

impl From<&HealthSnapshot> for ClusterHealth {
    fn from(s: &HealthSnapshot) -> Self {
        Self {
            cycle: s.cycle(),
            total_nodes: s.total_nodes(),
            healthy_nodes: s.healthy_nodes(),
            primary_nodes: s.primary_count(),
            health_percentage: s.health_percentage(),
            quorum: s.quorum(),
            stale_sources: s.stale_sources(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub is_safe: bool,
    pub can_execute: bool,
    pub warnings: Vec<String>,
    pub recommendation: String,
    pub durability: String,
    pub cluster_health: Option<ClusterHealth>,
}

pub struct ValidationAdvisor {
    health: SnapshotWatch,
    ledger: Arc<HistoryLedger<ValidationRecord>>,
}

impl ValidationAdvisor {
    pub fn new(
        health: SnapshotWatch,
        ledger: Arc<HistoryLedger<ValidationRecord>>,
    ) -> Self {
        Self { health, ledger }
    }

    pub async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationResult, ValidationError> {
        let durability = check_request(request)?;
        let snapshot = self.health.borrow().clone();
        let result = assess(durability, snapshot.as_deref());

        info!(
            collection = %request.collection,
            durability = %durability,
            is_safe = result.is_safe,
            can_execute = result.can_execute,
            "write validated"
        );
        self.ledger
            .append(ValidationRecord {
                at: Utc::now(),
                collection: request.collection.clone(),
                durability: durability.to_string(),
                is_safe: result.is_safe,
                can_execute: result.can_execute,
                warnings: result.warnings.len(),
            })
            .await;
        Ok(result)
    }
}

/// Input checks; never touches cluster health.
fn check_request(request: &ValidationRequest) -> Result<DurabilityLevel, ValidationError> {
    if request.collection.trim().is_empty() {
        return Err(ValidationError::InvalidInput(
            "collection must not be empty".to_string(),
        ));
    }
    let durability = request.durability.parse::<DurabilityLevel>()?;
    let document: Value = serde_json::from_str(&request.document)?;
    if !document.is_object() {
        return Err(ValidationError::InvalidInput(
            "document must be a JSON object".to_string(),
        ));
    }
    Ok(durability)
}

/// Computes the verdicts for a durability level against a snapshot.
pub fn assess(
    durability: DurabilityLevel,
    snapshot: Option<&HealthSnapshot>,
) -> ValidationResult {
    let mut warnings = Vec::new();

    let is_safe = match durability {
        DurabilityLevel::Majority | DurabilityLevel::All => true,
        DurabilityLevel::Nodes(n) if n >= 2 => {
            snapshot.is_some_and(|s| 2 * n as usize > s.total_nodes())
        }
        _ => false,
    };
    if durability.is_single_node() {
        warnings.push(format!(
            "w:{durability} is acknowledged by a single node; the write can be lost on failover"
        ));
    } else if !is_safe {
        match snapshot {
            Some(s) => warnings.push(format!(
                "w:{durability} is not a majority of {} nodes",
                s.total_nodes()
            )),
            None => warnings.push(format!(
                "w:{durability} cannot be checked against cluster size yet"
            )),
        }
    }

    let Some(s) = snapshot else {
        warnings.push("No cluster health data yet; execution is blocked".to_string());
        return ValidationResult {
            is_safe,
            can_execute: false,
            recommendation: recommendation(is_safe, false, None),
            warnings,
            durability: durability.to_string(),
            cluster_health: None,
        };
    };

    match s.quorum() {
        QuorumState::Healthy => {}
        QuorumState::Degraded => warnings.push(format!(
            "Cluster is DEGRADED: {}/{} nodes up",
            s.healthy_nodes(),
            s.total_nodes()
        )),
        QuorumState::Critical => warnings.push(format!(
            "Cluster is CRITICAL: {}/{} nodes up, majority writes cannot be acknowledged",
            s.healthy_nodes(),
            s.total_nodes()
        )),
    }
    if s.split_brain() {
        warnings.push(format!(
            "Split-brain: {} nodes claim PRIMARY",
            s.primary_count()
        ));
    } else if s.primary_count() == 0 {
        warnings.push("No PRIMARY is available to accept writes".to_string());
    }
    if durability == DurabilityLevel::All && s.healthy_nodes() < s.total_nodes() {
        warnings.push(format!(
            "w:all waits for every node but only {}/{} are up",
            s.healthy_nodes(),
            s.total_nodes()
        ));
    }
    if s.stale_sources() > 0 {
        warnings.push(format!(
            "{} of {} status sources did not answer in the last cycle",
            s.stale_sources(),
            s.sources().len()
        ));
    }

    let can_execute = is_safe && s.quorum().holds_quorum() && !s.split_brain();
    ValidationResult {
        is_safe,
        can_execute,
        recommendation: recommendation(is_safe, can_execute, Some(s)),
        warnings,
        durability: durability.to_string(),
        cluster_health: Some(ClusterHealth::from(s)),
    }
}

fn recommendation(
    is_safe: bool,
    can_execute: bool,
    snapshot: Option<&HealthSnapshot>,
) -> String {
    match (is_safe, can_execute, snapshot) {
        (true, true, _) => "Write is safe to execute".to_string(),
        (false, _, _) => "Use w:majority so the write survives a primary failover".to_string(),
        (true, false, None) => "Wait for cluster health data before writing".to_string(),
        (true, false, Some(s)) if s.split_brain() => {
            "Hold writes until a single PRIMARY remains".to_string()
        }
        (true, false, Some(_)) => {
            "Hold writes until quorum is restored".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{Liveness, NodeRecord, NodeRole, SnapshotBuilder};
    use tokio::sync::watch;
    use tracing_test::traced_test;

    fn cluster(up: usize, down: usize) -> HealthSnapshot {
        let mut nodes = Vec::new();
        for i in 0..up {
            let role = if i == 0 { NodeRole::Primary } else { NodeRole::Secondary };
            nodes.push(NodeRecord::new(format!("n{i}"), role, Liveness::Up));
        }
        for i in 0..down {
            nodes.push(NodeRecord::new(format!("d{i}"), NodeRole::Unknown, Liveness::Down));
        }
        SnapshotBuilder::new(1).with_nodes(nodes).build()
    }

    #[test]
    fn single_node_durability_is_never_safe() {
        for level in ["1", "default", "0"] {
            let level: DurabilityLevel = level.parse().unwrap();
            for snapshot in [Some(cluster(3, 0)), Some(cluster(1, 2)), None] {
                let r = assess(level, snapshot.as_ref());
                assert!(!r.is_safe);
                assert!(!r.can_execute);
            }
        }
    }

    #[test]
    fn majority_follows_quorum() {
        let healthy = assess(DurabilityLevel::Majority, Some(&cluster(3, 0)));
        assert!(healthy.is_safe && healthy.can_execute);
        assert!(healthy.warnings.is_empty());

        let degraded = assess(DurabilityLevel::Majority, Some(&cluster(2, 1)));
        assert!(degraded.can_execute);
        assert_eq!(degraded.warnings.len(), 1);

        let critical = assess(DurabilityLevel::Majority, Some(&cluster(1, 2)));
        assert!(critical.is_safe);
        assert!(!critical.can_execute);
    }

    #[test]
    fn numeric_level_needs_a_majority_of_members() {
        assert!(assess(DurabilityLevel::Nodes(2), Some(&cluster(3, 0))).is_safe);
        assert!(!assess(DurabilityLevel::Nodes(2), Some(&cluster(5, 0))).is_safe);
        assert!(!assess(DurabilityLevel::Nodes(2), None).is_safe);
    }

    #[test]
    fn split_brain_blocks_execution() {
        let s = SnapshotBuilder::new(1)
            .with_nodes(vec![
                NodeRecord::new("a", NodeRole::Primary, Liveness::Up),
                NodeRecord::new("b", NodeRole::Primary, Liveness::Up),
                NodeRecord::new("c", NodeRole::Secondary, Liveness::Up),
            ])
            .build();
        let r = assess(DurabilityLevel::Majority, Some(&s));
        assert!(r.is_safe);
        assert!(!r.can_execute);
        assert!(r.warnings.iter().any(|w| w.contains("Split-brain")));
    }

    #[test]
    fn unknown_level_is_an_input_error() {
        assert!(matches!(
            "quorum-ish".parse::<DurabilityLevel>(),
            Err(ValidationError::UnknownDurability(_))
        ));
        assert_eq!("MAJORITY".parse::<DurabilityLevel>().unwrap(), DurabilityLevel::Majority);
    }

    #[traced_test]
    #[tokio::test]
    async fn input_is_checked_before_health_and_calls_are_recorded() {
        let (health, watch) = watch::channel(None);
        let ledger = Arc::new(HistoryLedger::new(10));
        let advisor = ValidationAdvisor::new(watch, ledger.clone());

        let bad = ValidationRequest {
            collection: "orders".to_string(),
            document: "{not json".to_string(),
            durability: "majority".to_string(),
        };
        assert!(matches!(
            advisor.validate(&bad).await,
            Err(ValidationError::MalformedDocument(_))
        ));
        let array = ValidationRequest {
            document: "[1, 2]".to_string(),
            ..bad.clone()
        };
        assert!(matches!(
            advisor.validate(&array).await,
            Err(ValidationError::InvalidInput(_))
        ));
        assert_eq!(ledger.len().await, 0);

        let ok = ValidationRequest {
            document: r#"{"item": "book", "qty": 1}"#.to_string(),
            ..bad
        };
        let blind = advisor.validate(&ok).await.unwrap();
        assert!(blind.is_safe);
        assert!(!blind.can_execute);
        assert!(blind.cluster_health.is_none());

        health.send_replace(Some(Arc::new(cluster(3, 0))));
        let result = advisor.validate(&ok).await.unwrap();
        assert!(result.can_execute);
        assert_eq!(result.cluster_health.map(|h| h.total_nodes), Some(3));

        let recent = ledger.recent().await;
        assert_eq!(recent.len(), 2);
        assert!(recent[0].can_execute);
        assert_eq!(recent[1].collection, "orders");
        assert!(logs_contain("write validated"));
    }
}
