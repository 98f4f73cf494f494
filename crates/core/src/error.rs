use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type FlowResult<T> = Result<T, FlowError>;

/// Errors surfaced by registry and control-surface operations.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Campaign {0} not found")]
    NotFound(String),

    #[error("Campaign {0} already exists")]
    AlreadyExists(String),

    #[error("Campaign {0} already has a run in flight")]
    AlreadyRunning(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Classification of a failure recorded in `CampaignState::last_error`.
///
/// `HandlerRetryable` is consumed by the router's bounded retry and only
/// survives to the terminal state when retries exhaust. Everything else
/// terminates the run in `Error` without touching other campaigns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    HandlerRetryable,
    HandlerFatal,
    StepLimitExceeded,
    Cancelled,
}

/// Serializable error record carried inside a campaign's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDescriptor {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ErrorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
