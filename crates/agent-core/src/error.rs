//! Error Types

use std::time::Duration;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
#[derive(Error, Debug)]
pub enum AgentError {
    /// Missing or rejected credential. Fatal for the session.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Model service rejected the request for a non-auth, non-rate reason
    #[error("Provider error: {0}")]
    Provider(String),

    /// Network failure, timeout or 5xx from an upstream service
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Tool not found in registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// A tool with this name is already registered
    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    /// Tool execution failed
    #[error("Tool execution error: {0}")]
    ToolExecution(String),

    /// Model output did not match the action/answer grammar
    #[error("Parse error: {0}")]
    Parse(String),

    /// Maximum iterations reached in reasoning loop
    #[error("Maximum iterations ({0}) reached")]
    MaxIterations(usize),

    /// Wall-clock limit reached in reasoning loop
    #[error("Time limit of {0:?} reached")]
    TimeLimit(Duration),

    /// The run was cancelled by the host surface
    #[error("Run cancelled")]
    Cancelled,

    /// Session error
    #[error("Session error: {0}")]
    Session(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::ProviderUnavailable(_)
                | AgentError::RateLimited(_)
                | AgentError::TimeLimit(_)
        )
    }

    /// Stable machine-readable code for the host surface
    pub fn code(&self) -> &'static str {
        match self {
            AgentError::Auth(_) => "AUTH_ERROR",
            AgentError::Provider(_) => "PROVIDER_ERROR",
            AgentError::ProviderUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AgentError::RateLimited(_) => "RATE_LIMITED",
            AgentError::ToolNotFound(_) => "TOOL_NOT_FOUND",
            AgentError::DuplicateTool(_) => "DUPLICATE_TOOL",
            AgentError::ToolExecution(_) => "TOOL_EXECUTION_ERROR",
            AgentError::Parse(_) => "PARSE_ERROR",
            AgentError::MaxIterations(_) => "STEP_LIMIT_EXCEEDED",
            AgentError::TimeLimit(_) => "TIME_LIMIT_EXCEEDED",
            AgentError::Cancelled => "CANCELLED",
            AgentError::Session(_) => "SESSION_ERROR",
            AgentError::Config(_) => "CONFIG_ERROR",
            AgentError::Json(_) | AgentError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            AgentError::Auth(_) => "Authentication failed. Please re-enter your API key.".into(),
            AgentError::Provider(msg) => format!("The AI service encountered an error: {}", msg),
            AgentError::ProviderUnavailable(_) => "The AI service is currently unavailable. Please try again.".into(),
            AgentError::RateLimited(_) => "You've made too many requests. Please wait a moment and try again.".into(),
            AgentError::ToolNotFound(name) => format!("The tool '{}' is not available.", name),
            AgentError::ToolExecution(msg) => format!("Tool error: {}", msg),
            AgentError::Parse(_) => "The model did not produce a usable answer. Please rephrase the question.".into(),
            AgentError::MaxIterations(_) => "Could not complete the request within the step limit. Please try a simpler question.".into(),
            AgentError::TimeLimit(_) => "Could not complete the request in time. Please try again.".into(),
            AgentError::Cancelled => "The request was cancelled.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Other(err.to_string())
    }
}
