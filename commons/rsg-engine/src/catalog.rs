//! Registry of fault-injection scenarios.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::CatalogError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// Presentation hint carried by log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Stage {
    StopNode {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        restart_after_secs: Option<u64>,
    },
    IsolateNodes {
        targets: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        restart_after_secs: Option<u64>,
        /// Pause between consecutive targets.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pause_secs: Option<u64>,
    },
    Wait {
        secs: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tick_secs: Option<u64>,
    },
    Narrate {
        lines: Vec<String>,
        #[serde(default)]
        tone: Tone,
    },
}

impl Stage {
    pub fn stop(target: impl Into<String>) -> Self {
        Stage::StopNode {
            target: target.into(),
            restart_after_secs: None,
        }
    }

    pub fn isolate<I, S>(targets: I, pause_secs: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Stage::IsolateNodes {
            targets: targets.into_iter().map(Into::into).collect(),
            restart_after_secs: None,
            pause_secs: Some(pause_secs),
        }
    }

    pub fn wait(secs: u64) -> Self {
        Stage::Wait {
            secs,
            label: None,
            tick_secs: None,
        }
    }

    pub fn ticking(secs: u64, tick_secs: u64, label: impl Into<String>) -> Self {
        Stage::Wait {
            secs,
            label: Some(label.into()),
            tick_secs: Some(tick_secs),
        }
    }

    pub fn narrate(tone: Tone, lines: &[&str]) -> Self {
        Stage::Narrate {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            tone,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Stage::StopNode { .. } => "stop-node",
            Stage::IsolateNodes { .. } => "isolate-nodes",
            Stage::Wait { .. } => "wait",
            Stage::Narrate { .. } => "narrate",
        }
    }

    /// Nodes this stage acts on.
    pub fn targets(&self) -> Vec<&str> {
        match self {
            Stage::StopNode { target, .. } => vec![target.as_str()],
            Stage::IsolateNodes { targets, .. } => {
                targets.iter().map(String::as_str).collect()
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub risk: RiskLevel,
    pub targets: Vec<String>,
    pub duration_secs: u64,
    pub stages: Vec<Stage>,
}

impl ScenarioDefinition {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    /// Auto-restart delay handed to Node Control; defaults to the scenario
    /// duration.
    pub fn restart_after(&self, stage_override: Option<u64>) -> Duration {
        Duration::from_secs(stage_override.unwrap_or(self.duration_secs))
    }

    fn check(&self) -> Result<(), CatalogError> {
        if self.duration_secs == 0 {
            return Err(CatalogError::ZeroDuration(self.id.clone()));
        }
        if self.stages.is_empty() {
            return Err(CatalogError::EmptyScript(self.id.clone()));
        }
        for (index, stage) in self.stages.iter().enumerate() {
            let invalid = |reason: &str| CatalogError::InvalidStage {
                scenario: self.id.clone(),
                index,
                reason: reason.to_string(),
            };
            match stage {
                Stage::Wait { secs: 0, .. } => {
                    return Err(invalid("wait must be positive"));
                }
                Stage::Wait {
                    tick_secs: Some(0), ..
                } => return Err(invalid("tick must be positive")),
                Stage::IsolateNodes { targets, .. } if targets.is_empty() => {
                    return Err(invalid("no isolation targets"));
                }
                Stage::Narrate { lines, .. } if lines.is_empty() => {
                    return Err(invalid("nothing to narrate"));
                }
                _ => {}
            }
            for target in stage.targets() {
                if !self.targets.iter().any(|t| t == target) {
                    return Err(CatalogError::UndeclaredTarget {
                        scenario: self.id.clone(),
                        target: target.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct CatalogFile {
    scenarios: Vec<ScenarioDefinition>,
}

/// Read-only after construction.
#[derive(Debug, Clone)]
pub struct ScenarioCatalog {
    scenarios: Vec<ScenarioDefinition>,
}

impl ScenarioCatalog {
    pub fn new(scenarios: Vec<ScenarioDefinition>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for scenario in &scenarios {
            if !seen.insert(scenario.id.as_str()) {
                return Err(CatalogError::DuplicateId(scenario.id.clone()));
            }
            scenario.check()?;
        }
        Ok(Self { scenarios })
    }

    pub fn builtin() -> Self {
        Self {
            scenarios: builtin_scenarios(),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = serde_yaml::from_str(content)?;
        Self::new(file.scenarios)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let catalog = Self::from_yaml_str(&content)?;
        info!(
            "loaded {} scenarios from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn get(&self, id: &str) -> Result<&ScenarioDefinition, CatalogError> {
        self.scenarios
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| CatalogError::UnknownScenario(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.scenarios.iter().any(|s| s.id == id)
    }

    pub fn list(&self) -> &[ScenarioDefinition] {
        &self.scenarios
    }

    pub fn len(&self) -> usize {
        self.scenarios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenarios.is_empty()
    }
}

impl Default for ScenarioCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

const PRIMARY: &str = "mongo-primary";
const SECONDARY1: &str = "mongo-secondary1";
const SECONDARY2: &str = "mongo-secondary2";

fn single_node_failure(id: &str, name: &str, node: &str) -> ScenarioDefinition {
    ScenarioDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: format!("{node} is stopped and restarted by its host"),
        risk: RiskLevel::Low,
        targets: vec![node.to_string()],
        duration_secs: 30,
        stages: vec![
            Stage::stop(node),
            Stage::narrate(Tone::Info, &["Auto-restart in 30s"]),
            Stage::ticking(30, 5, "Auto-restart"),
            Stage::narrate(Tone::Success, &["Container auto-restarted"]),
        ],
    }
}

pub fn builtin_scenarios() -> Vec<ScenarioDefinition> {
    vec![
        single_node_failure("secondary1-fail", "Secondary Node Failure", SECONDARY1),
        single_node_failure(
            "secondary2-fail",
            "Secondary Node Failure 2",
            SECONDARY2,
        ),
        ScenarioDefinition {
            id: "primary-fail".to_string(),
            name: "Primary Node Failure".to_string(),
            description: "The primary is stopped and an election follows"
                .to_string(),
            risk: RiskLevel::Medium,
            targets: vec![PRIMARY.to_string()],
            duration_secs: 45,
            stages: vec![
                Stage::stop(PRIMARY),
                Stage::narrate(Tone::Warning, &["Election process:"]),
                Stage::wait(2),
                Stage::narrate(
                    Tone::Warning,
                    &[
                        "  Primary heartbeat lost from secondaries",
                        "  Secondaries detect primary failure",
                    ],
                ),
                Stage::wait(3),
                Stage::narrate(
                    Tone::Warning,
                    &[
                        "  Initiating election vote",
                        "    mongo-secondary1 votes: mongo-secondary2",
                        "    mongo-secondary2 votes: itself",
                    ],
                ),
                Stage::wait(3),
                Stage::narrate(
                    Tone::Success,
                    &[
                        "  mongo-secondary2 elected as PRIMARY",
                        "  Election complete in ~8s",
                    ],
                ),
                Stage::ticking(30, 5, "Auto-restart"),
                Stage::narrate(Tone::Success, &["mongo-primary rejoins as SECONDARY"]),
            ],
        },
        ScenarioDefinition {
            id: "network-partition".to_string(),
            name: "Network Partition".to_string(),
            description: "Both secondaries are cut off from the primary"
                .to_string(),
            risk: RiskLevel::Critical,
            targets: vec![SECONDARY1.to_string(), SECONDARY2.to_string()],
            duration_secs: 60,
            stages: vec![
                Stage::narrate(
                    Tone::Warning,
                    &[
                        "Network partition:",
                        "  Isolating mongo-secondary1, mongo-secondary2",
                        "  Primary segment: mongo-primary",
                    ],
                ),
                Stage::isolate([SECONDARY1, SECONDARY2], 2),
                Stage::narrate(
                    Tone::Warning,
                    &[
                        "Network split active:",
                        "  Partition 1: [PRIMARY] mongo-primary",
                        "  Partition 2: [ISOLATED] mongo-secondary1, mongo-secondary2",
                        "Isolated secondaries cannot vote, no new primary is elected",
                        "Primary is left without a majority (1/3)",
                    ],
                ),
                Stage::ticking(60, 15, "Partition active"),
                Stage::narrate(
                    Tone::Success,
                    &["Network restored, nodes rejoin cluster"],
                ),
            ],
        },
        ScenarioDefinition {
            id: "cascading-failure".to_string(),
            name: "Cascading Failure".to_string(),
            description: "Secondaries fail one after another until quorum is lost"
                .to_string(),
            risk: RiskLevel::Critical,
            targets: vec![SECONDARY1.to_string(), SECONDARY2.to_string()],
            duration_secs: 90,
            stages: vec![
                Stage::narrate(
                    Tone::Warning,
                    &["Cascading failure:", "Stage 1: mongo-secondary1 failure"],
                ),
                Stage::stop(SECONDARY1),
                Stage::narrate(
                    Tone::Info,
                    &[
                        "  2/3 nodes available",
                        "  Quorum still maintained",
                        "  w:majority writes still acknowledged",
                    ],
                ),
                Stage::wait(12),
                Stage::narrate(
                    Tone::Warning,
                    &["Stage 2: mongo-secondary2 failure (cascading)"],
                ),
                Stage::stop(SECONDARY2),
                Stage::narrate(
                    Tone::Error,
                    &[
                        "Critical state reached:",
                        "  Only 1/3 nodes remaining (mongo-primary)",
                        "  Quorum lost",
                        "  w:majority writes blocked",
                        "  Data redundancy lost",
                    ],
                ),
                Stage::ticking(30, 10, "Waiting for recovery"),
                Stage::narrate(
                    Tone::Info,
                    &["Stage 3: recovery", "  Secondary nodes restart"],
                ),
                Stage::wait(3),
                Stage::narrate(
                    Tone::Success,
                    &[
                        "  Secondaries rejoin cluster",
                        "  Quorum restored",
                        "  Cluster recovered",
                    ],
                ),
            ],
        },
    ]
}
