//! Status Aggregator: periodic fan-out to every configured status source,
//! merged into one published [`HealthSnapshot`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::error::SourceError;
use crate::history::{HealthCheckRecord, HistoryLedger};
use crate::snapshot::{HealthSnapshot, QuorumState, SnapshotBuilder, SourceStatus};
use crate::source::{SourcePayload, StatusSource};

/// `None` until the first cycle in which any source answered.
pub type SnapshotWatch = watch::Receiver<Option<Arc<HealthSnapshot>>>;

#[derive(Debug, Clone, Copy)]
pub struct AggregatorSettings {
    pub poll_interval: Duration,
    pub source_timeout: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(3000),
            source_timeout: Duration::from_millis(5000),
        }
    }
}

impl From<&EngineConfig> for AggregatorSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            source_timeout: config.source_timeout(),
        }
    }
}

struct AggregationState {
    cycle: u64,
    /// Last successful payload per source, indexed like `sources`.
    cache: Vec<Option<SourcePayload>>,
    statuses: Vec<SourceStatus>,
    last_signal: Option<HealthSignal>,
}

/// The parts of a snapshot whose change is worth a check record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HealthSignal {
    quorum: QuorumState,
    split_brain: bool,
    recovery_required: Option<bool>,
    nodes_needing_recovery: Option<u32>,
}

impl From<&HealthSnapshot> for HealthSignal {
    fn from(snapshot: &HealthSnapshot) -> Self {
        let recovery = snapshot.recovery();
        Self {
            quorum: snapshot.quorum(),
            split_brain: snapshot.split_brain(),
            recovery_required: recovery.map(|r| r.recovery_required),
            nodes_needing_recovery: recovery.map(|r| r.nodes_needing_recovery),
        }
    }
}

pub struct StatusAggregator {
    sources: Vec<Arc<dyn StatusSource>>,
    settings: AggregatorSettings,
    state: Mutex<AggregationState>,
    publisher: watch::Sender<Option<Arc<HealthSnapshot>>>,
    checks: Option<Arc<HistoryLedger<HealthCheckRecord>>>,
}

impl StatusAggregator {
    pub fn new(
        sources: Vec<Arc<dyn StatusSource>>,
        settings: AggregatorSettings,
    ) -> Self {
        let statuses = sources
            .iter()
            .map(|s| SourceStatus::new(s.name(), s.kind()))
            .collect();
        let (publisher, _) = watch::channel(None);
        Self {
            state: Mutex::new(AggregationState {
                cycle: 0,
                cache: vec![None; sources.len()],
                statuses,
                last_signal: None,
            }),
            sources,
            settings,
            publisher,
            checks: None,
        }
    }

    pub fn with_check_ledger(
        mut self,
        ledger: Arc<HistoryLedger<HealthCheckRecord>>,
    ) -> Self {
        self.checks = Some(ledger);
        self
    }

    pub fn settings(&self) -> AggregatorSettings {
        self.settings
    }

    /// Most recently published snapshot. Never waits on a running cycle.
    pub fn latest(&self) -> Option<Arc<HealthSnapshot>> {
        self.publisher.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotWatch {
        self.publisher.subscribe()
    }

    /// Runs one aggregation cycle and returns what it published.
    pub async fn poll(&self) -> Option<Arc<HealthSnapshot>> {
        let mut guard = self.state.lock().await;
        let deadline = self.settings.source_timeout;
        let results = join_all(self.sources.iter().map(|source| async move {
            match timeout(deadline, source.fetch()).await {
                Ok(result) => result,
                Err(_) => Err(SourceError::Timeout(deadline)),
            }
        }))
        .await;

        let state = &mut *guard;
        let now = Utc::now();
        for (index, result) in results.into_iter().enumerate() {
            let status = &mut state.statuses[index];
            match result {
                Ok(payload) => {
                    state.cache[index] = Some(payload);
                    status.fresh = true;
                    status.last_success = Some(now);
                    status.last_error = None;
                }
                Err(err) => {
                    warn!(source = %status.name, error = %err, "status source failed");
                    status.fresh = false;
                    status.last_error = Some(err.to_string());
                }
            }
        }

        if state.cache.iter().all(Option::is_none) {
            debug!("no status source has answered yet");
            return None;
        }

        state.cycle += 1;
        let mut builder = SnapshotBuilder::new(state.cycle);
        for payload in state.cache.iter().flatten() {
            builder.merge(payload.clone());
        }
        for status in &state.statuses {
            builder.source(status.clone());
        }
        let snapshot = Arc::new(builder.build());

        let signal = HealthSignal::from(snapshot.as_ref());
        if state.last_signal != Some(signal) {
            let previous = state.last_signal.map(|s| s.quorum);
            info!(
                cycle = snapshot.cycle(),
                quorum = %signal.quorum,
                split_brain = signal.split_brain,
                recovery_required = ?signal.recovery_required,
                "cluster health changed"
            );
            if let Some(checks) = &self.checks {
                checks
                    .append(HealthCheckRecord {
                        at: snapshot.taken_at(),
                        cycle: snapshot.cycle(),
                        previous,
                        quorum: snapshot.quorum(),
                        healthy_nodes: snapshot.healthy_nodes(),
                        total_nodes: snapshot.total_nodes(),
                        health_percentage: snapshot.health_percentage(),
                        split_brain: signal.split_brain,
                        recovery_required: signal.recovery_required,
                        nodes_needing_recovery: signal.nodes_needing_recovery,
                    })
                    .await;
            }
            state.last_signal = Some(signal);
        }

        debug!(
            cycle = snapshot.cycle(),
            healthy = snapshot.healthy_nodes(),
            total = snapshot.total_nodes(),
            stale = snapshot.stale_sources(),
            "snapshot published"
        );
        self.publisher.send_replace(Some(snapshot.clone()));
        Some(snapshot)
    }

    /// Starts the recurring poll loop. Each cycle runs in its own task so a
    /// panicking source cannot stop the cadence.
    pub fn spawn(self: &Arc<Self>, token: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = interval(this.settings.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                "status aggregator polling {} sources every {:?}",
                this.sources.len(),
                this.settings.poll_interval
            );
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let cycle = Arc::clone(&this);
                        if let Err(e) = tokio::spawn(async move { cycle.poll().await }).await {
                            error!(error = %e, "aggregation cycle aborted");
                        }
                    }
                }
            }
            info!("status aggregator stopped");
        })
    }
}
