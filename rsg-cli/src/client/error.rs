use std::fmt;

use serde::Deserialize;
use thiserror::Error;

/// Machine-readable `error.code` of a gateway error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCode {
    NoHealthData,
    UnknownScenario,
    AlreadyRunning,
    NotRunning,
    AlreadyCompleted,
    InvalidRequest,
    UnknownHistory,
    Other(String),
}

impl From<&str> for GatewayCode {
    fn from(code: &str) -> Self {
        match code {
            "NO_HEALTH_DATA" => GatewayCode::NoHealthData,
            "UNKNOWN_SCENARIO" => GatewayCode::UnknownScenario,
            "ALREADY_RUNNING" => GatewayCode::AlreadyRunning,
            "NOT_RUNNING" => GatewayCode::NotRunning,
            "ALREADY_COMPLETED" => GatewayCode::AlreadyCompleted,
            "INVALID_REQUEST" => GatewayCode::InvalidRequest,
            "UNKNOWN_HISTORY" => GatewayCode::UnknownHistory,
            other => GatewayCode::Other(other.to_string()),
        }
    }
}

impl fmt::Display for GatewayCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GatewayCode::NoHealthData => "NO_HEALTH_DATA",
            GatewayCode::UnknownScenario => "UNKNOWN_SCENARIO",
            GatewayCode::AlreadyRunning => "ALREADY_RUNNING",
            GatewayCode::NotRunning => "NOT_RUNNING",
            GatewayCode::AlreadyCompleted => "ALREADY_COMPLETED",
            GatewayCode::InvalidRequest => "INVALID_REQUEST",
            GatewayCode::UnknownHistory => "UNKNOWN_HISTORY",
            GatewayCode::Other(code) => code,
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("cannot reach gateway: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid gateway URL: {0}")]
    InvalidUrl(String),

    /// The gateway answered with its JSON error body.
    #[error("{message} ({code}, HTTP {status})")]
    Gateway {
        status: u16,
        code: GatewayCode,
        message: String,
    },

    /// Non-gateway error page, e.g. from a proxy or the router fallback.
    #[error("HTTP {status}: {body}")]
    Unexpected { status: u16, body: String },

    #[error("unreadable gateway response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl ClientError {
    pub fn from_response(status: u16, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody { error }) => ClientError::Gateway {
                status,
                code: GatewayCode::from(error.code.as_str()),
                message: error.message,
            },
            Err(_) => ClientError::Unexpected {
                status,
                body: body.trim().to_string(),
            },
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Gateway { status, .. }
            | ClientError::Unexpected { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&GatewayCode> {
        match self {
            ClientError::Gateway { code, .. } => Some(code),
            _ => None,
        }
    }
}
