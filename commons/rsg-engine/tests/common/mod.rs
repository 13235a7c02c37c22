#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rsg_engine::catalog::{RiskLevel, ScenarioDefinition, Stage};
use rsg_engine::{
    ControlError, Liveness, NodeControl, NodeRecord, NodeRole, SourceError,
    SourceKind, SourcePayload, StatusSource,
};

/// Records every call; `stop`/`isolate` of `fail_on` is rejected.
#[derive(Default)]
pub struct FakeControl {
    calls: Mutex<Vec<(&'static str, String)>>,
    fail_on: Option<String>,
    delay: Duration,
}

impl FakeControl {
    pub fn failing_on(node: &str) -> Self {
        Self {
            fail_on: Some(node.to_string()),
            ..Default::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<(&'static str, String)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn called(&self, action: &str, node: &str) -> bool {
        self.calls().iter().any(|(a, n)| *a == action && n == node)
    }

    fn record(&self, action: &'static str, node: &str) {
        self.calls.lock().unwrap().push((action, node.to_string()));
    }
}

#[async_trait::async_trait]
impl NodeControl for FakeControl {
    async fn stop(
        &self,
        node: &str,
        _restart_after: Duration,
    ) -> Result<(), ControlError> {
        self.record("stop", node);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail_on.as_deref() == Some(node) {
            return Err(ControlError::Rejected(format!(
                "No such container: {node}"
            )));
        }
        Ok(())
    }

    async fn start(&self, node: &str) -> Result<(), ControlError> {
        self.record("start", node);
        Ok(())
    }
}

/// Answers with whatever payload is currently set; fails with HTTP 503
/// while unset.
pub struct FakeSource {
    name: String,
    kind: SourceKind,
    payload: Mutex<Option<SourcePayload>>,
    delay: Duration,
    panic_once: AtomicBool,
}

impl FakeSource {
    pub fn new(name: &str, kind: SourceKind, payload: Option<SourcePayload>) -> Self {
        Self {
            name: name.to_string(),
            kind,
            payload: Mutex::new(payload),
            delay: Duration::ZERO,
            panic_once: AtomicBool::new(false),
        }
    }

    pub fn membership(name: &str, nodes: Vec<NodeRecord>) -> Self {
        Self::new(name, SourceKind::Cluster, Some(SourcePayload::Membership(nodes)))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn panicking_once(self) -> Self {
        self.panic_once.store(true, Ordering::SeqCst);
        self
    }

    pub fn set(&self, payload: Option<SourcePayload>) {
        *self.payload.lock().unwrap() = payload;
    }
}

#[async_trait::async_trait]
impl StatusSource for FakeSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self) -> Result<SourcePayload, SourceError> {
        if self.panic_once.swap(false, Ordering::SeqCst) {
            panic!("source exploded");
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let payload = self.payload.lock().unwrap().clone();
        payload.ok_or(SourceError::Status(503))
    }
}

pub fn node(name: &str, role: NodeRole, up: bool) -> NodeRecord {
    let liveness = if up { Liveness::Up } else { Liveness::Down };
    NodeRecord::new(name, role, liveness)
}

pub fn three_nodes(up: usize) -> Vec<NodeRecord> {
    vec![
        node("mongo-primary", NodeRole::Primary, up > 0),
        node("mongo-secondary1", NodeRole::Secondary, up > 1),
        node("mongo-secondary2", NodeRole::Secondary, up > 2),
    ]
}

pub fn scenario(id: &str, targets: &[&str], duration_secs: u64, stages: Vec<Stage>) -> ScenarioDefinition {
    ScenarioDefinition {
        id: id.to_string(),
        name: format!("Scenario {id}"),
        description: String::new(),
        risk: RiskLevel::Low,
        targets: targets.iter().map(|t| t.to_string()).collect(),
        duration_secs,
        stages,
    }
}
