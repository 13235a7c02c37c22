use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ControlError;

/// Lifecycle operations on named nodes. A `stop` asks the node-hosting layer
/// to bring the node back on its own after `restart_after`.
#[async_trait::async_trait]
pub trait NodeControl: Send + Sync {
    async fn stop(
        &self,
        node: &str,
        restart_after: Duration,
    ) -> Result<(), ControlError>;

    async fn start(&self, node: &str) -> Result<(), ControlError>;

    /// Cut a node off from its peers. The hosting layer in use isolates by
    /// stopping the node, so this defaults to `stop`.
    async fn isolate(
        &self,
        node: &str,
        restart_after: Duration,
    ) -> Result<(), ControlError> {
        self.stop(node, restart_after).await
    }
}

#[derive(Serialize)]
struct StopRequest<'a> {
    node: &'a str,
    duration: u64,
}

#[derive(Serialize)]
struct StartRequest<'a> {
    node: &'a str,
}

#[derive(Deserialize, Default)]
struct ControlReply {
    success: Option<bool>,
    error: Option<String>,
}

/// Node Control over the container-management endpoints of the consensus
/// service.
pub struct HttpNodeControl {
    base_url: String,
    client: Client,
}

impl HttpNodeControl {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ControlError> {
        let client = Client::builder()
            .user_agent(concat!("rsg-engine/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, client })
    }

    async fn post<B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ControlError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        if !status.is_success() {
            return Err(ControlError::Status {
                status: status.as_u16(),
                message: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        let reply: ControlReply =
            serde_json::from_slice(&bytes).unwrap_or_default();
        if reply.success == Some(false) {
            let message = reply
                .error
                .unwrap_or_else(|| "operation rejected".to_string());
            return Err(ControlError::Rejected(message));
        }
        debug!("node control {} accepted", path);
        Ok(())
    }
}

#[async_trait::async_trait]
impl NodeControl for HttpNodeControl {
    async fn stop(
        &self,
        node: &str,
        restart_after: Duration,
    ) -> Result<(), ControlError> {
        let body = StopRequest {
            node,
            duration: restart_after.as_secs(),
        };
        self.post("/docker/stop", &body).await
    }

    async fn start(&self, node: &str) -> Result<(), ControlError> {
        self.post("/docker/start", &StartRequest { node }).await
    }
}
