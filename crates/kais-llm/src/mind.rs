//! The `Mind` capability trait (§9): `think(input) -> output`. Any concrete
//! provider (cloud, local) implements this without the rest of the system
//! knowing which is in use.

use crate::types::{ThinkRequest, ThinkResult};

pub type MindResult<T> = Result<T, MindError>;

#[derive(Debug, thiserror::Error)]
pub enum MindError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("rate limited: retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("context overflow: {0}")]
    ContextOverflow(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("cancelled")]
    Cancelled,
}

impl MindError {
    /// Transient per the error taxonomy (§7): retryable with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RequestFailed(_) | Self::RateLimited { .. })
    }
}

#[async_trait::async_trait]
pub trait Mind: Send + Sync {
    fn name(&self) -> &str;
    fn models(&self) -> &[&str];

    fn supports_model(&self, model: &str) -> bool {
        self.models().iter().any(|m| *m == model || model.starts_with(m))
    }

    async fn think(&self, request: ThinkRequest) -> MindResult<ThinkResult>;
}
