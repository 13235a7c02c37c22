use std::time::Duration;

use envconfig::Envconfig;

use crate::error::ConfigError;
use crate::source::SourceKind;

pub const DEFAULT_STATUS_SOURCES: &str = "cluster=http://localhost:8001/cluster/status,\
node-health=http://localhost:8003/health/all,\
replication=http://localhost:8002/replication/lag,\
recovery=http://localhost:8005/recovery/status,\
transaction-log=http://localhost:8004/logs/stats";

#[derive(Envconfig, Clone, Debug)]
pub struct EngineConfig {
    #[envconfig(from = "RSG_POLL_INTERVAL_MS", default = "3000")]
    pub poll_interval_ms: u64,
    #[envconfig(from = "RSG_SOURCE_TIMEOUT_MS", default = "5000")]
    pub source_timeout_ms: u64,
    #[envconfig(from = "RSG_CONTROL_TIMEOUT_MS", default = "30000")]
    pub control_timeout_ms: u64,
    #[envconfig(from = "RSG_HISTORY_CAPACITY", default = "10")]
    pub history_capacity: usize,
    #[envconfig(from = "RSG_WAIT_NARRATION_INTERVAL_MS", default = "5000")]
    pub wait_narration_interval_ms: u64,
    #[envconfig(from = "RSG_RECOVERY_ESTIMATE_DIVISOR", default = "3")]
    pub recovery_estimate_divisor: u64,
    /// Comma separated `kind=url` pairs, polled in this order.
    #[envconfig(from = "RSG_STATUS_SOURCES", default = "")]
    pub status_sources: String,
    #[envconfig(from = "RSG_NODE_CONTROL_URL", default = "http://localhost:8001")]
    pub node_control_url: String,
    #[envconfig(from = "RSG_CATALOG_PATH")]
    pub catalog_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEndpoint {
    pub kind: SourceKind,
    pub url: String,
}

impl EngineConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::init_from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("poll_interval_ms", self.poll_interval_ms),
            ("source_timeout_ms", self.source_timeout_ms),
            ("control_timeout_ms", self.control_timeout_ms),
            ("history_capacity", self.history_capacity as u64),
            (
                "wait_narration_interval_ms",
                self.wait_narration_interval_ms,
            ),
            ("recovery_estimate_divisor", self.recovery_estimate_divisor),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        self.source_endpoints()?;
        Ok(())
    }

    /// Falls back to the local deployment layout when nothing is configured.
    pub fn source_endpoints(&self) -> Result<Vec<SourceEndpoint>, ConfigError> {
        let raw = if self.status_sources.trim().is_empty() {
            DEFAULT_STATUS_SOURCES
        } else {
            self.status_sources.as_str()
        };
        parse_source_list(raw)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    pub fn control_timeout(&self) -> Duration {
        Duration::from_millis(self.control_timeout_ms)
    }

    pub fn wait_narration_interval(&self) -> Duration {
        Duration::from_millis(self.wait_narration_interval_ms)
    }
}

pub fn parse_source_list(raw: &str) -> Result<Vec<SourceEndpoint>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (kind, url) = entry
                .split_once('=')
                .ok_or_else(|| ConfigError::InvalidSource(entry.to_string()))?;
            let url = url.trim();
            if url.is_empty() {
                return Err(ConfigError::InvalidSource(entry.to_string()));
            }
            let kind = kind
                .parse::<SourceKind>()
                .map_err(ConfigError::UnknownSourceKind)?;
            Ok(SourceEndpoint {
                kind,
                url: url.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::init_from_hashmap(&HashMap::new()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.poll_interval(), Duration::from_secs(3));
        assert_eq!(config.history_capacity, 10);
        assert_eq!(config.recovery_estimate_divisor, 3);
        let endpoints = config.source_endpoints().unwrap();
        assert_eq!(endpoints.len(), 5);
        assert_eq!(endpoints[0].kind, SourceKind::Cluster);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut env = HashMap::new();
        env.insert("RSG_HISTORY_CAPACITY".to_string(), "0".to_string());
        let config = EngineConfig::init_from_hashmap(&env).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Zero("history_capacity"))
        ));
    }

    #[test]
    fn source_list_is_parsed_in_order() {
        let list = parse_source_list(
            " replication=http://r/lag , health=http://h/all,",
        )
        .unwrap();
        assert_eq!(
            list,
            vec![
                SourceEndpoint {
                    kind: SourceKind::Replication,
                    url: "http://r/lag".into()
                },
                SourceEndpoint {
                    kind: SourceKind::NodeHealth,
                    url: "http://h/all".into()
                },
            ]
        );
        assert!(matches!(
            parse_source_list("nope"),
            Err(ConfigError::InvalidSource(_))
        ));
        assert!(matches!(
            parse_source_list("weather=http://w"),
            Err(ConfigError::UnknownSourceKind(k)) if k == "weather"
        ));
    }
}
