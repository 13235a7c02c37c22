//! Scenario Runner: executes one scenario at a time, stage by stage.
//!
//! The run guard lives in [`RunSlot`]. A run moves `IDLE -> RUNNING` in
//! [`ScenarioRunner::start`] and back to `IDLE` when its task finalises,
//! whether the script succeeded, a stage failed, or the task itself died.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::aggregator::SnapshotWatch;
use crate::catalog::{ScenarioCatalog, ScenarioDefinition, Stage, Tone};
use crate::config::EngineConfig;
use crate::control::NodeControl;
use crate::error::{ControlError, RunnerError, StageError};
use crate::history::{HistoryEntry, HistoryLedger, RunOutcome};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
pub struct RunnerSettings {
    /// Upper bound on a single Node Control call.
    pub control_timeout: Duration,
    /// Default spacing of "time remaining" lines during waits.
    pub narration_interval: Duration,
    pub recovery_divisor: u64,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            control_timeout: Duration::from_secs(30),
            narration_interval: Duration::from_secs(5),
            recovery_divisor: 3,
        }
    }
}

impl From<&EngineConfig> for RunnerSettings {
    fn from(config: &EngineConfig) -> Self {
        Self {
            control_timeout: config.control_timeout(),
            narration_interval: config.wait_narration_interval(),
            recovery_divisor: config.recovery_estimate_divisor,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunLogEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    /// Milliseconds since the run started.
    pub offset_ms: u64,
    pub stage: Option<usize>,
    pub tone: Tone,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioRun {
    pub run_id: u64,
    pub scenario_id: String,
    pub scenario_name: String,
    pub started_at: DateTime<Utc>,
    pub stage_index: Option<usize>,
    pub stage_count: usize,
    pub state: RunState,
    pub failure: Option<String>,
    pub log: Vec<RunLogEntry>,
}

impl ScenarioRun {
    fn new(run_id: u64, scenario: &ScenarioDefinition) -> Self {
        Self {
            run_id,
            scenario_id: scenario.id.clone(),
            scenario_name: scenario.name.clone(),
            started_at: Utc::now(),
            stage_index: None,
            stage_count: scenario.stages.len(),
            state: RunState::Running,
            failure: None,
            log: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerStatus {
    Idle { last: Option<ScenarioRun> },
    Running { run: ScenarioRun },
}

impl RunnerStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, RunnerStatus::Running { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    Log { run_id: u64, entry: RunLogEntry },
    Stage { run_id: u64, index: usize, count: usize },
    Finished { run_id: u64, entry: HistoryEntry },
}

/// Ticket for an accepted run.
#[derive(Debug)]
pub struct RunHandle {
    pub run_id: u64,
    pub scenario_id: String,
    join: JoinHandle<HistoryEntry>,
}

impl RunHandle {
    /// Resolves once the run is finalised and recorded.
    pub async fn outcome(self) -> Result<HistoryEntry, RunnerError> {
        self.join
            .await
            .map_err(|e| RunnerError::Aborted(e.to_string()))
    }
}

struct ActiveRun {
    run: ScenarioRun,
    clock: Instant,
    cancel: CancellationToken,
    /// Every stage is done; the run can no longer be cancelled.
    settled: bool,
}

struct RunSlot {
    active: Option<ActiveRun>,
    last: Option<ScenarioRun>,
}

struct RunnerInner {
    catalog: Arc<ScenarioCatalog>,
    control: Arc<dyn NodeControl>,
    ledger: Arc<HistoryLedger<HistoryEntry>>,
    health: SnapshotWatch,
    settings: RunnerSettings,
    slot: Mutex<RunSlot>,
    events: broadcast::Sender<RunEvent>,
    next_run_id: AtomicU64,
}

#[derive(Clone)]
pub struct ScenarioRunner {
    inner: Arc<RunnerInner>,
}

impl ScenarioRunner {
    pub fn new(
        catalog: Arc<ScenarioCatalog>,
        control: Arc<dyn NodeControl>,
        ledger: Arc<HistoryLedger<HistoryEntry>>,
        health: SnapshotWatch,
        settings: RunnerSettings,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(RunnerInner {
                catalog,
                control,
                ledger,
                health,
                settings,
                slot: Mutex::new(RunSlot {
                    active: None,
                    last: None,
                }),
                events,
                next_run_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn catalog(&self) -> &ScenarioCatalog {
        &self.inner.catalog
    }

    /// Accepts the scenario and spawns its execution. Rejected without any
    /// state change when another run is active.
    pub async fn start(&self, scenario_id: &str) -> Result<RunHandle, RunnerError> {
        let scenario = self.inner.catalog.get(scenario_id)?.clone();

        let mut slot = self.inner.slot.lock().await;
        if let Some(active) = &slot.active {
            return Err(RunnerError::AlreadyRunning(
                active.run.scenario_id.clone(),
            ));
        }
        let run_id = self.inner.next_run_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        slot.active = Some(ActiveRun {
            run: ScenarioRun::new(run_id, &scenario),
            clock: Instant::now(),
            cancel: cancel.clone(),
            settled: false,
        });
        drop(slot);

        info!(run_id, scenario = %scenario.id, "scenario run started");
        let inner = Arc::clone(&self.inner);
        let join = tokio::spawn(async move {
            let task = tokio::spawn(execute(
                Arc::clone(&inner),
                run_id,
                scenario.clone(),
                cancel,
            ));
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = format!("run task aborted: {e}");
                    inner.log(run_id, None, Tone::Error, reason.clone()).await;
                    RunOutcome::Failed {
                        stage: None,
                        reason,
                    }
                }
            };
            inner.finish(run_id, &scenario, outcome).await
        });

        Ok(RunHandle {
            run_id,
            scenario_id: scenario_id.to_string(),
            join,
        })
    }

    /// Requests cancellation of the active run and returns its id. A run
    /// whose stages have all completed is only being recorded and is left
    /// alone.
    pub async fn cancel(&self) -> Result<u64, RunnerError> {
        let slot = self.inner.slot.lock().await;
        match &slot.active {
            Some(active) if active.settled => {
                Err(RunnerError::Completed(active.run.run_id))
            }
            Some(active) => {
                info!(run_id = active.run.run_id, "cancellation requested");
                active.cancel.cancel();
                Ok(active.run.run_id)
            }
            None => Err(RunnerError::NotRunning),
        }
    }

    pub async fn status(&self) -> RunnerStatus {
        let slot = self.inner.slot.lock().await;
        match &slot.active {
            Some(active) => RunnerStatus::Running {
                run: active.run.clone(),
            },
            None => RunnerStatus::Idle {
                last: slot.last.clone(),
            },
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.slot.lock().await.active.is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.inner.events.subscribe()
    }
}

async fn execute(
    inner: Arc<RunnerInner>,
    run_id: u64,
    scenario: ScenarioDefinition,
    cancel: CancellationToken,
) -> RunOutcome {
    let count = scenario.stages.len();
    inner
        .log(
            run_id,
            None,
            Tone::Info,
            format!(
                "Starting: {} ({} risk, ~{}s)",
                scenario.name, scenario.risk, scenario.duration_secs
            ),
        )
        .await;
    inner.precheck(run_id, &scenario).await;

    // Every node a stop or isolate was issued for, in order.
    let mut touched: Vec<String> = Vec::new();
    for (index, stage) in scenario.stages.iter().enumerate() {
        inner.enter_stage(run_id, index, count).await;
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(StageError::Cancelled),
            r = inner.run_stage(run_id, index, &scenario, stage, &mut touched) => r,
        };
        if let Err(err) = result {
            if matches!(err, StageError::Cancelled) {
                inner.restore(run_id, index, &touched).await;
            }
            let reason = err.to_string();
            inner
                .log(
                    run_id,
                    Some(index),
                    Tone::Error,
                    format!(
                        "Stage {}/{} ({}) failed: {}",
                        index + 1,
                        count,
                        stage.kind_name(),
                        reason
                    ),
                )
                .await;
            return RunOutcome::Failed {
                stage: Some(index),
                reason,
            };
        }
    }
    if !inner.settle(run_id).await {
        // Cancelled between the last stage and this point.
        let last = count.saturating_sub(1);
        inner.restore(run_id, last, &touched).await;
        let reason = StageError::Cancelled.to_string();
        inner
            .log(
                run_id,
                Some(last),
                Tone::Error,
                format!("Run {reason} after its last stage"),
            )
            .await;
        return RunOutcome::Failed {
            stage: Some(last),
            reason,
        };
    }
    inner.postcheck(run_id).await;
    RunOutcome::Succeeded
}

impl RunnerInner {
    async fn log(
        &self,
        run_id: u64,
        stage: Option<usize>,
        tone: Tone,
        message: impl Into<String>,
    ) {
        let message = message.into();
        let mut slot = self.slot.lock().await;
        let Some(active) = slot.active.as_mut().filter(|a| a.run.run_id == run_id)
        else {
            return;
        };
        let now = Utc::now();
        let at = active.run.log.last().map_or(now, |prev| prev.at.max(now));
        let entry = RunLogEntry {
            seq: active.run.log.len() as u64,
            at,
            offset_ms: active.clock.elapsed().as_millis() as u64,
            stage,
            tone,
            message,
        };
        debug!(run_id, "{}", entry.message);
        active.run.log.push(entry.clone());
        let _ = self.events.send(RunEvent::Log { run_id, entry });
    }

    /// Marks the run settled unless a cancel got in first.
    async fn settle(&self, run_id: u64) -> bool {
        let mut slot = self.slot.lock().await;
        match slot.active.as_mut().filter(|a| a.run.run_id == run_id) {
            Some(active) if active.cancel.is_cancelled() => false,
            Some(active) => {
                active.settled = true;
                true
            }
            None => true,
        }
    }

    async fn enter_stage(&self, run_id: u64, index: usize, count: usize) {
        let mut slot = self.slot.lock().await;
        if let Some(active) = slot.active.as_mut().filter(|a| a.run.run_id == run_id) {
            active.run.stage_index = Some(index);
            let _ = self.events.send(RunEvent::Stage {
                run_id,
                index,
                count,
            });
        }
    }

    async fn run_stage(
        &self,
        run_id: u64,
        index: usize,
        scenario: &ScenarioDefinition,
        stage: &Stage,
        touched: &mut Vec<String>,
    ) -> Result<(), StageError> {
        let at = Some(index);
        match stage {
            Stage::StopNode {
                target,
                restart_after_secs,
            } => {
                let restart = scenario.restart_after(*restart_after_secs);
                self.log(
                    run_id,
                    at,
                    Tone::Warning,
                    format!("Stopping {target} (auto-restart in {}s)", restart.as_secs()),
                )
                .await;
                touched.push(target.clone());
                self.control_call("stop", target, self.control.stop(target, restart))
                    .await?;
                self.log(run_id, at, Tone::Success, format!("{target} stopped"))
                    .await;
            }
            Stage::IsolateNodes {
                targets,
                restart_after_secs,
                pause_secs,
            } => {
                let restart = scenario.restart_after(*restart_after_secs);
                for (i, target) in targets.iter().enumerate() {
                    if i > 0 {
                        if let Some(pause) = pause_secs {
                            sleep(Duration::from_secs(*pause)).await;
                        }
                    }
                    touched.push(target.clone());
                    self.control_call(
                        "isolate",
                        target,
                        self.control.isolate(target, restart),
                    )
                    .await?;
                    self.log(run_id, at, Tone::Warning, format!("{target} isolated"))
                        .await;
                }
            }
            Stage::Wait {
                secs,
                label,
                tick_secs,
            } => {
                let total = Duration::from_secs(*secs);
                let tick = tick_secs
                    .map(Duration::from_secs)
                    .unwrap_or(self.settings.narration_interval);
                let label = label.as_deref().unwrap_or("Waiting");
                let mut elapsed = Duration::ZERO;
                while elapsed < total {
                    let step = tick.min(total - elapsed);
                    sleep(step).await;
                    elapsed += step;
                    if elapsed < total {
                        self.log(
                            run_id,
                            at,
                            Tone::Info,
                            format!(
                                "{label}: {}/{} elapsed ({} remaining)",
                                fmt_secs(elapsed),
                                fmt_secs(total),
                                fmt_secs(total - elapsed)
                            ),
                        )
                        .await;
                    }
                }
            }
            Stage::Narrate { lines, tone } => {
                for line in lines {
                    self.log(run_id, at, *tone, line.clone()).await;
                }
            }
        }
        Ok(())
    }

    async fn control_call<F>(
        &self,
        action: &'static str,
        node: &str,
        call: F,
    ) -> Result<(), StageError>
    where
        F: Future<Output = Result<(), ControlError>>,
    {
        let deadline = self.settings.control_timeout;
        let result = match timeout(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(ControlError::Timeout(deadline)),
        };
        result.map_err(|source| StageError::Control {
            action,
            node: node.to_string(),
            source,
        })
    }

    /// Brings back every node the cancelled run took down.
    async fn restore(&self, run_id: u64, index: usize, touched: &[String]) {
        let at = Some(index);
        for node in touched {
            let result = match timeout(
                self.settings.control_timeout,
                self.control.start(node),
            )
            .await
            {
                Ok(result) => result,
                Err(_) => Err(ControlError::Timeout(self.settings.control_timeout)),
            };
            match result {
                Ok(()) => {
                    self.log(run_id, at, Tone::Success, format!("{node} restarted"))
                        .await
                }
                Err(e) => {
                    warn!(run_id, node = %node, error = %e, "restore failed");
                    self.log(
                        run_id,
                        at,
                        Tone::Error,
                        format!("Restart of {node} failed: {e}"),
                    )
                    .await
                }
            }
        }
    }

    /// Narrates the cluster state before the first stage. Never waits for
    /// a poll.
    async fn precheck(&self, run_id: u64, scenario: &ScenarioDefinition) {
        let snapshot = self.health.borrow().clone();
        let Some(snapshot) = snapshot else {
            self.log(
                run_id,
                None,
                Tone::Warning,
                "No cluster health data yet, preconditions not checked",
            )
            .await;
            return;
        };
        self.log(
            run_id,
            None,
            Tone::Info,
            format!(
                "Cluster before run: {}/{} nodes up, quorum {}",
                snapshot.healthy_nodes(),
                snapshot.total_nodes(),
                snapshot.quorum()
            ),
        )
        .await;
        for target in &scenario.targets {
            match snapshot.node(target) {
                None => {
                    self.log(
                        run_id,
                        None,
                        Tone::Warning,
                        format!("{target} is not reported by any status source"),
                    )
                    .await
                }
                Some(node) if !node.is_up() => {
                    self.log(
                        run_id,
                        None,
                        Tone::Warning,
                        format!("{target} is already DOWN"),
                    )
                    .await
                }
                Some(_) => {}
            }
        }
        if snapshot.split_brain() {
            self.log(
                run_id,
                None,
                Tone::Warning,
                format!("{} nodes claim PRIMARY", snapshot.primary_count()),
            )
            .await;
        }
    }

    async fn postcheck(&self, run_id: u64) {
        let snapshot = self.health.borrow().clone();
        if let Some(snapshot) = snapshot {
            self.log(
                run_id,
                None,
                Tone::Info,
                format!(
                    "Cluster after run: {}/{} nodes up, quorum {}",
                    snapshot.healthy_nodes(),
                    snapshot.total_nodes(),
                    snapshot.quorum()
                ),
            )
            .await;
        }
    }

    async fn finish(
        &self,
        run_id: u64,
        scenario: &ScenarioDefinition,
        outcome: RunOutcome,
    ) -> HistoryEntry {
        if outcome.is_success() {
            self.log(run_id, None, Tone::Success, "Scenario complete").await;
        }

        let mut slot = self.slot.lock().await;
        let (mut run, elapsed) = match slot.active.take_if(|a| a.run.run_id == run_id) {
            Some(active) => (active.run, active.clock.elapsed()),
            None => (ScenarioRun::new(run_id, scenario), Duration::ZERO),
        };
        run.state = match outcome {
            RunOutcome::Succeeded => RunState::Succeeded,
            RunOutcome::Failed { .. } => RunState::Failed,
        };
        if let RunOutcome::Failed { reason, .. } = &outcome {
            run.failure = Some(reason.clone());
        }

        let entry = HistoryEntry {
            run_id,
            scenario_id: scenario.id.clone(),
            name: scenario.name.clone(),
            risk: scenario.risk,
            started_at: run.started_at,
            duration_secs: scenario.duration_secs,
            elapsed_ms: elapsed.as_millis() as u64,
            recovery_estimate_secs: outcome.is_success().then(|| {
                recovery_estimate(scenario.duration_secs, self.settings.recovery_divisor)
            }),
            outcome,
        };
        match &entry.outcome {
            RunOutcome::Succeeded => {
                info!(run_id, scenario = %scenario.id, "scenario run succeeded")
            }
            RunOutcome::Failed { stage, reason } => warn!(
                run_id,
                scenario = %scenario.id,
                stage = ?stage,
                "scenario run failed: {}",
                reason
            ),
        }

        self.ledger.append(entry.clone()).await;
        slot.last = Some(run);
        drop(slot);

        let _ = self.events.send(RunEvent::Finished {
            run_id,
            entry: entry.clone(),
        });
        entry
    }
}

pub fn recovery_estimate(duration_secs: u64, divisor: u64) -> u64 {
    (duration_secs as f64 / divisor.max(1) as f64).round() as u64
}

fn fmt_secs(d: Duration) -> String {
    if d.subsec_millis() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{:.1}s", d.as_secs_f64())
    }
}
