pub mod advisor;
pub mod aggregator;
pub mod catalog;
pub mod config;
pub mod control;
mod engine;
pub mod error;
pub mod history;
pub mod runner;
pub mod snapshot;
pub mod source;

pub use advisor::{
    DurabilityLevel, ValidationAdvisor, ValidationRequest, ValidationResult,
};
pub use aggregator::{AggregatorSettings, SnapshotWatch, StatusAggregator};
pub use catalog::{RiskLevel, ScenarioCatalog, ScenarioDefinition, Stage, Tone};
pub use config::EngineConfig;
pub use control::{HttpNodeControl, NodeControl};
pub use engine::Engine;
pub use error::*;
pub use history::{
    HealthCheckRecord, HistoryEntry, HistoryLedger, Ledgers, RunOutcome,
    ValidationRecord,
};
pub use runner::{
    RunEvent, RunHandle, RunLogEntry, RunState, RunnerSettings, RunnerStatus,
    ScenarioRun, ScenarioRunner,
};
pub use snapshot::{HealthSnapshot, Liveness, NodeRecord, NodeRole, QuorumState};
pub use source::{HttpStatusSource, SourceKind, SourcePayload, StatusSource};
