use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("source reported failure: {0}")]
    Reported(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("{0}")]
    Rejected(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("duplicate scenario id: {0}")]
    DuplicateId(String),

    #[error("scenario {0} has an empty stage script")]
    EmptyScript(String),

    #[error("scenario {scenario}, stage {index}: {reason}")]
    InvalidStage {
        scenario: String,
        index: usize,
        reason: String,
    },

    #[error("scenario {scenario} targets undeclared node {target}")]
    UndeclaredTarget { scenario: String, target: String },

    #[error("scenario {0} must have a positive duration")]
    ZeroDuration(String),

    #[error("catalog parsing error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("catalog read error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("scenario {0} is already running")]
    AlreadyRunning(String),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("no scenario is running")]
    NotRunning,

    #[error("run {0} already completed")]
    Completed(u64),

    #[error("run task aborted: {0}")]
    Aborted(String),
}

/// Failure of a single stage; terminal for the run it belongs to.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("{action} {node} failed: {source}")]
    Control {
        action: &'static str,
        node: String,
        #[source]
        source: ControlError,
    },

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid request: {0}")]
    InvalidInput(String),

    #[error("document is not valid JSON: {0}")]
    MalformedDocument(#[from] serde_json::Error),

    #[error("unknown durability level: {0}")]
    UnknownDurability(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("environment error: {0}")]
    Env(#[from] envconfig::Error),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("invalid status source entry '{0}', expected <kind>=<url>")]
    InvalidSource(String),

    #[error("unknown status source kind: {0}")]
    UnknownSourceKind(String),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("status source error: {0}")]
    Source(#[from] SourceError),

    #[error("node control error: {0}")]
    Control(#[from] ControlError),
}
