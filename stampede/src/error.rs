use stampede_core::ConfigError;
use thiserror::Error;

/// Failure reported by the HTTP transport: the request never produced a response.
#[derive(Clone, Debug, Error, PartialEq)]
#[error("{msg}")]
pub struct TransportError {
    pub msg: String,
    pub timeout: bool,
}

impl TransportError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            timeout: false,
        }
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            timeout: true,
        }
    }
}

#[cfg(feature = "reqwest")]
impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            timeout: err.is_timeout(),
            msg: err.to_string(),
        }
    }
}

/// Why a single step did not succeed. Local to the VU that hit it.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum StepError {
    #[error("Network error: {0}")]
    Network(#[from] TransportError),

    #[error("Unexpected status code {0}")]
    UnexpectedStatus(u16),

    #[error("Malformed response in \"{step}\": {reason}")]
    MalformedResponse { step: String, reason: String },

    #[error("Missing data: {0}")]
    MissingData(String),

    #[error("Could not build request: {0}")]
    Request(String),
}

impl StepError {
    pub fn malformed(step: &str, err: impl std::fmt::Display) -> Self {
        Self::MalformedResponse {
            step: step.to_string(),
            reason: err.to_string(),
        }
    }

    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingData(what.into())
    }
}

/// Errors that stop a run before any virtual user starts.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Setup failed: {0}")]
    Setup(String),
}
