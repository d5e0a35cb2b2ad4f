//! Crate-wide error type.

use thiserror::Error;

/// Orchestrator error type.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("backend '{target}' error: {source}")]
    Backend {
        target: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("circuit open for '{target}'")]
    CircuitOpen { target: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("plan exceeded the maximum step count")]
    LoopGuard,

    #[error("self-modification error: {0}")]
    SelfModification(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session error: {0}")]
    Session(String),

    #[error("unknown error: {0}")]
    Unknown(String),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Unknown(err.to_string())
    }
}

impl OrchestratorError {
    pub fn backend(target: impl Into<String>, source: reqwest::Error) -> Self {
        OrchestratorError::Backend {
            target: target.into(),
            source,
        }
    }

    /// True for failures the decision engine's retry policy should treat as transient.
    pub fn is_transient(&self) -> bool {
        let text = self.to_string().to_lowercase();
        ["timeout", "connection", "temporary", "unavailable"]
            .iter()
            .any(|kw| text.contains(kw))
    }
}
