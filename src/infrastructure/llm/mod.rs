//! LLM-calling boundary: a trait-based client returning structured JSON,
//! with OpenRouter as the shipped implementation.

mod openrouter;

pub use openrouter::OpenRouterClient;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },
    #[error("client error ({status}): {body}")]
    Client { status: u16, body: String },
    #[error("parse error: {0}")]
    Parse(String),
}

impl LlmError {
    /// Transient errors are worth retrying inside the client's own budget.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::Network(_) | LlmError::RateLimited(_) | LlmError::Server { .. }
        )
    }
}

/// Retry budget for transient failures. The caller still wraps the whole
/// call in its own hard timeout; this budget must stay well inside it.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_retry_duration: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_retry_duration: Duration::from_secs(30),
        }
    }
}

/// A capability that evaluates a prompt and returns one JSON document.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn evaluate(
        &self,
        prompt: &str,
        temperature: f32,
    ) -> Result<serde_json::Value, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn given_transient_kinds_when_is_transient_should_return_true() {
        assert!(LlmError::Network("reset".to_string()).is_transient());
        assert!(LlmError::RateLimited("429".to_string()).is_transient());
        assert!(LlmError::Server {
            status: 502,
            body: "bad gateway".to_string()
        }
        .is_transient());
    }

    #[test]
    fn given_permanent_kinds_when_is_transient_should_return_false() {
        assert!(!LlmError::Parse("not json".to_string()).is_transient());
        assert!(!LlmError::Client {
            status: 400,
            body: "bad request".to_string()
        }
        .is_transient());
    }
}
