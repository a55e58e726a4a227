//! # agent-core
//!
//! Provider-agnostic ReAct agent with a named tool registry.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Agent                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │  Reasoning  │  │    Tools    │  │   LlmProvider       │  │
//! │  │    Loop     │──│   Registry  │──│   (Strategy)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! │         │                                                    │
//! │  ┌─────────────┐                                             │
//! │  │ ReAct parser│  Thought / Action / Action Input / Final    │
//! │  └─────────────┘                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `LlmProvider` trait lets the agent run against Groq, Ollama, or the
//! scripted provider in [`mock`] without changing agent logic.

pub mod error;
pub mod events;
pub mod message;
pub mod mock;
pub mod provider;
pub mod react;
pub mod reasoning;
pub mod session;
pub mod tool;

pub use error::{AgentError, Result};
pub use events::{AgentEvent, EventSender};
pub use message::{Conversation, Message, Role};
pub use provider::{Completion, GenerationOptions, LlmProvider};
pub use react::{AgentAction, AgentStep};
pub use reasoning::{Agent, AgentBuilder, AgentConfig, AgentRun, AgentState, RunOptions};
pub use session::{Session, SessionId};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult, ToolSchema};

// Host crates use the same token type for cancellation
pub use tokio_util::sync::CancellationToken;
