//! Agent progress events
//!
//! Emitted while a run is in flight so a host surface can show the agent's
//! thoughts and tool calls as they happen.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Sender half handed to [`crate::reasoning::Agent::run`]
pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// A model call is about to be made
    Thinking { step: usize },

    /// The model selected a tool
    ToolCall {
        step: usize,
        thought: String,
        tool: String,
        input: String,
    },

    /// A tool returned (or failed)
    Observation {
        step: usize,
        tool: String,
        output: String,
        success: bool,
    },

    /// Model output was rejected by the grammar
    ParseError { step: usize, message: String },

    FinalAnswer { answer: String },
}

/// Send if someone is listening. A dropped receiver is not an error.
pub(crate) fn emit(events: Option<&EventSender>, event: AgentEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}
