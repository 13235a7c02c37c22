use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::advisor::ValidationAdvisor;
use crate::aggregator::{AggregatorSettings, StatusAggregator};
use crate::catalog::ScenarioCatalog;
use crate::config::EngineConfig;
use crate::control::{HttpNodeControl, NodeControl};
use crate::error::EngineError;
use crate::history::Ledgers;
use crate::runner::{RunnerSettings, ScenarioRunner};
use crate::source::{HttpStatusSource, StatusSource};

/// All engine components wired to one shared snapshot feed and one set of
/// ledgers.
pub struct Engine {
    pub aggregator: Arc<StatusAggregator>,
    pub runner: ScenarioRunner,
    pub advisor: ValidationAdvisor,
    pub catalog: Arc<ScenarioCatalog>,
    pub ledgers: Ledgers,
    token: CancellationToken,
}

impl Engine {
    pub fn new(
        config: &EngineConfig,
        catalog: ScenarioCatalog,
        sources: Vec<Arc<dyn StatusSource>>,
        control: Arc<dyn NodeControl>,
    ) -> Self {
        let ledgers = Ledgers::new(config.history_capacity);
        let aggregator = Arc::new(
            StatusAggregator::new(sources, AggregatorSettings::from(config))
                .with_check_ledger(ledgers.checks.clone()),
        );
        let catalog = Arc::new(catalog);
        let runner = ScenarioRunner::new(
            catalog.clone(),
            control,
            ledgers.scenarios.clone(),
            aggregator.subscribe(),
            RunnerSettings::from(config),
        );
        let advisor =
            ValidationAdvisor::new(aggregator.subscribe(), ledgers.validations.clone());
        Self {
            aggregator,
            runner,
            advisor,
            catalog,
            ledgers,
            token: CancellationToken::new(),
        }
    }

    /// Builds HTTP collaborators and the catalog from configuration.
    pub async fn from_config(config: &EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let catalog = match &config.catalog_path {
            Some(path) => ScenarioCatalog::load(path).await?,
            None => ScenarioCatalog::builtin(),
        };
        let mut sources: Vec<Arc<dyn StatusSource>> = Vec::new();
        for endpoint in config.source_endpoints()? {
            info!("status source {} at {}", endpoint.kind, endpoint.url);
            sources.push(Arc::new(HttpStatusSource::new(
                endpoint.kind,
                endpoint.url,
                config.source_timeout(),
            )?));
        }
        let control = Arc::new(HttpNodeControl::new(
            config.node_control_url.clone(),
            config.control_timeout(),
        )?);
        Ok(Self::new(config, catalog, sources, control))
    }

    /// Starts the aggregator's recurring poll loop.
    pub fn start(&self) -> JoinHandle<()> {
        self.aggregator.spawn(self.token.child_token())
    }

    pub fn shutdown(&self) {
        info!("engine shutting down");
        self.token.cancel();
    }
}
