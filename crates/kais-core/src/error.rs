//! Error taxonomy shared by every kais crate, per the error handling design:
//! transient, budget-exceeded, tool, LLM, protocol-violation and validation kinds.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("path traversal: {0}")]
    PathTraversal(String),

    #[error("topology violation: {0}")]
    TopologyViolation(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("spawn rejected: {0}")]
    SpawnRejected(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("llm error: {provider} - {message}")]
    LlmError { provider: String, message: String },

    #[error("tool error: {name} - {message}")]
    ToolError { name: String, message: String },

    #[error("transient error: {0}")]
    Transient(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn path_traversal(path: impl Into<String>) -> Self {
        Self::PathTraversal(path.into())
    }

    pub fn topology_violation(message: impl Into<String>) -> Self {
        Self::TopologyViolation(message.into())
    }

    pub fn llm_error(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LlmError {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn tool_error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Whether this kind of error should be retried with backoff (§7 taxonomy).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_) | Self::IoError(_))
    }
}
