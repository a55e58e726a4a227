//! Error Types for the Math Solver

use agent_core::AgentError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("Knowledge source error: {0}")]
    Knowledge(String),

    #[error("Empty input for {0}")]
    EmptyInput(&'static str),

    #[error("Model returned no text")]
    EmptyCompletion,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Tool failures reach the agent as observations, never as run failures
impl From<SolverError> for AgentError {
    fn from(err: SolverError) -> Self {
        AgentError::ToolExecution(err.to_string())
    }
}
