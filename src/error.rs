use std::time::Duration;

use thiserror::Error;

use crate::llm::Message;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid tool name: {0:?}")]
    InvalidName(String),
    #[error("tool description for {0} contains control characters")]
    InvalidDescription(String),
    #[error("duplicate tool registered: {0}")]
    Duplicate(String),
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("backend protocol error: {0}")]
    Protocol(String),
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),
    #[error("generation input must not be empty")]
    EmptyInput,
}

impl ProviderError {
    pub(crate) fn from_transport(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_decode() {
            Self::Protocol(err.to_string())
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("iteration budget exhausted ({max_iterations} tool calls)")]
    IterationBudgetExceeded {
        max_iterations: u32,
        last_message: Box<Message>,
    },
    #[error("agent stream ended without a final answer")]
    MissingFinalAnswer,
    #[error("agent run exceeded {0:?}")]
    Timeout(Duration),
    #[error("agent configuration error: {0}")]
    Config(String),
}
