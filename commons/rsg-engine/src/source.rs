use std::{collections::BTreeMap, fmt::Display, str::FromStr, time::Duration};

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SourceError;
use crate::snapshot::{
    Liveness, NodeLag, NodeRecord, NodeRole, RecoverySummary,
    ReplicationSummary, TransactionLogSummary,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    Cluster,
    NodeHealth,
    Replication,
    Recovery,
    TransactionLog,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Cluster => "cluster",
            SourceKind::NodeHealth => "node-health",
            SourceKind::Replication => "replication",
            SourceKind::Recovery => "recovery",
            SourceKind::TransactionLog => "transaction-log",
        }
    }
}

impl Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cluster" => Ok(SourceKind::Cluster),
            "node-health" | "health" => Ok(SourceKind::NodeHealth),
            "replication" => Ok(SourceKind::Replication),
            "recovery" => Ok(SourceKind::Recovery),
            "transaction-log" | "logs" => Ok(SourceKind::TransactionLog),
            other => Err(other.to_string()),
        }
    }
}

/// The fields one source contributes to a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SourcePayload {
    Membership(Vec<NodeRecord>),
    Replication(ReplicationSummary),
    Recovery(RecoverySummary),
    TransactionLog(TransactionLogSummary),
}

/// Read-only health endpoint of the replicated store.
#[async_trait::async_trait]
pub trait StatusSource: Send + Sync {
    fn name(&self) -> &str;
    fn kind(&self) -> SourceKind;
    async fn fetch(&self) -> Result<SourcePayload, SourceError>;
}

pub struct HttpStatusSource {
    name: String,
    kind: SourceKind,
    url: String,
    client: Client,
}

impl HttpStatusSource {
    pub fn new(
        kind: SourceKind,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(concat!("rsg-engine/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            name: kind.as_str().to_string(),
            kind,
            url: url.into(),
            client,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl StatusSource for HttpStatusSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self) -> Result<SourcePayload, SourceError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status(status.as_u16()));
        }
        let body: Value = response.json().await?;
        parse_payload(self.kind, body)
    }
}

#[derive(Deserialize)]
struct MembershipDoc {
    #[serde(alias = "nodes")]
    members: Vec<MemberDoc>,
}

#[derive(Deserialize)]
struct MemberDoc {
    name: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    health: Value,
    #[serde(default, alias = "uptime_seconds")]
    uptime: Option<f64>,
}

#[derive(Deserialize)]
struct ReplicationDoc {
    #[serde(default)]
    max_lag_seconds: f64,
    #[serde(default)]
    overall_status: String,
    #[serde(default)]
    lag_details: Vec<LagDoc>,
}

#[derive(Deserialize)]
struct LagDoc {
    node: String,
    lag_seconds: f64,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct RecoveryDoc {
    nodes_needing_recovery: u32,
    #[serde(default)]
    recovery_required: bool,
    #[serde(default)]
    status: String,
}

#[derive(Deserialize)]
struct TransactionLogDoc {
    total_operations: u64,
    #[serde(default)]
    operations_by_result: Vec<GroupCount>,
}

#[derive(Deserialize)]
struct GroupCount {
    #[serde(rename = "_id")]
    id: Option<String>,
    count: u64,
}

/// Parses a status document according to the source kind.
pub fn parse_payload(
    kind: SourceKind,
    body: Value,
) -> Result<SourcePayload, SourceError> {
    if body.get("status").and_then(Value::as_str) == Some("error") {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unspecified error");
        return Err(SourceError::Reported(message.to_string()));
    }
    match kind {
        SourceKind::Cluster | SourceKind::NodeHealth => {
            let doc: MembershipDoc = decode(body)?;
            let nodes = doc.members.into_iter().map(member_record).collect();
            Ok(SourcePayload::Membership(nodes))
        }
        SourceKind::Replication => {
            let doc: ReplicationDoc = decode(body)?;
            Ok(SourcePayload::Replication(ReplicationSummary {
                max_lag_secs: doc.max_lag_seconds,
                overall_status: doc.overall_status,
                lag: doc
                    .lag_details
                    .into_iter()
                    .map(|l| NodeLag {
                        node: node_name(&l.node).to_string(),
                        lag_secs: l.lag_seconds,
                        status: l.status,
                    })
                    .collect(),
            }))
        }
        SourceKind::Recovery => {
            let doc: RecoveryDoc = decode(body)?;
            Ok(SourcePayload::Recovery(RecoverySummary {
                nodes_needing_recovery: doc.nodes_needing_recovery,
                recovery_required: doc.recovery_required
                    || doc.nodes_needing_recovery > 0,
                status: doc.status,
            }))
        }
        SourceKind::TransactionLog => {
            let doc: TransactionLogDoc = decode(body)?;
            let mut by_result = BTreeMap::new();
            for group in doc.operations_by_result {
                let key = group.id.unwrap_or_else(|| "unknown".to_string());
                *by_result.entry(key).or_insert(0) += group.count;
            }
            Ok(SourcePayload::TransactionLog(TransactionLogSummary {
                total_operations: doc.total_operations,
                by_result,
            }))
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(body: Value) -> Result<T, SourceError> {
    serde_json::from_value(body).map_err(|e| SourceError::Malformed(e.to_string()))
}

fn member_record(member: MemberDoc) -> NodeRecord {
    let liveness = match &member.health {
        Value::String(s) if s.eq_ignore_ascii_case("healthy") => Liveness::Up,
        Value::Number(n) if n.as_f64() == Some(1.0) => Liveness::Up,
        Value::Bool(true) => Liveness::Up,
        _ => Liveness::Down,
    };
    NodeRecord {
        name: node_name(&member.name).to_string(),
        address: member.name.clone(),
        role: NodeRole::parse(&member.state),
        liveness,
        uptime_secs: member.uptime.unwrap_or(0.0).max(0.0) as u64,
    }
}

/// `mongo-primary:27017` names the node `mongo-primary`.
fn node_name(address: &str) -> &str {
    address.split(':').next().unwrap_or(address)
}
