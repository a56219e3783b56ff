use std::time::Duration;

use async_trait::async_trait;
use drivethru_core::domain::conversation::{ChatMessage, ToolCall};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// JSON-Schema signature of one tool, as published to the provider.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSignature {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

#[derive(Clone, Copy, Debug)]
pub struct DecisionRequest<'a> {
    pub system_prompt: &'a str,
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolSignature],
}

/// Either a reply to the customer or a batch of tool invocations.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Decision {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl Decision {
    pub fn respond(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_calls: Vec::new() }
    }

    pub fn call_tools(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { content: content.into(), tool_calls }
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DecisionError {
    #[error("decision provider timed out after {0:?}")]
    Timeout(Duration),
    #[error("decision provider is rate limiting requests")]
    RateLimited { retry_after: Option<Duration> },
    #[error("could not reach decision provider: {0}")]
    Connection(String),
    #[error("decision provider unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },
    #[error("decision provider rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("decision provider returned malformed output: {0}")]
    MalformedOutput(String),
}

impl DecisionError {
    /// Timeouts, backpressure and connection failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Connection(_) | Self::Unavailable { .. }
        )
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, DecisionError>;
}

#[async_trait]
impl<P> DecisionProvider for std::sync::Arc<P>
where
    P: DecisionProvider + ?Sized,
{
    async fn decide(&self, request: DecisionRequest<'_>) -> Result<Decision, DecisionError> {
        (**self).decide(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{Decision, DecisionError};

    #[test]
    fn transient_classes_are_retryable() {
        assert!(DecisionError::Timeout(Duration::from_secs(30)).is_transient());
        assert!(DecisionError::RateLimited { retry_after: None }.is_transient());
        assert!(DecisionError::Connection("reset".to_string()).is_transient());
        assert!(DecisionError::Unavailable { status: 503, message: String::new() }.is_transient());
    }

    #[test]
    fn rejections_and_parse_failures_are_not_retried() {
        assert!(!DecisionError::Rejected { status: 401, message: "bad key".to_string() }.is_transient());
        assert!(!DecisionError::MalformedOutput("arguments were not json".to_string()).is_transient());
    }

    #[test]
    fn rate_limit_exposes_retry_hint() {
        let error = DecisionError::RateLimited { retry_after: Some(Duration::from_secs(2)) };
        assert_eq!(error.retry_after(), Some(Duration::from_secs(2)));
        assert!(!Decision::respond("Hi there!").requests_tools());
    }
}
