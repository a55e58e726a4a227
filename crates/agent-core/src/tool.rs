//! Tool System
//!
//! Tools are named capabilities that take one free-text input and return one
//! observation string. They are registered once at startup and looked up by
//! name when the reasoning loop selects an action.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{AgentError, Result};

/// Tool call request parsed from model output
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool identifier
    pub name: String,

    /// Free-text action input
    pub input: String,

    /// Optional call ID for tracking
    #[serde(default)]
    pub id: Option<String>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            input: input.into(),
            id: Some(uuid::Uuid::new_v4().to_string()),
        }
    }
}

/// Result from tool execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    pub name: String,

    /// Call ID (if provided in request)
    pub id: Option<String>,

    pub success: bool,

    /// Observation text (success output or error description)
    pub output: String,
}

impl ToolResult {
    pub fn success(name: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: true,
            output: output.into(),
        }
    }

    pub fn failure(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            success: false,
            output: error.into(),
        }
    }

    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id;
        self
    }
}

/// Tool description shown to the model
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique tool identifier, as the model must spell it in `Action:`
    pub name: String,

    /// Human-readable description the model uses to pick a tool
    pub description: String,

    #[serde(default)]
    pub category: Option<String>,
}

/// Tool trait - implement to add new capabilities
#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> ToolSchema;

    /// Run the tool on the action input and return the observation text
    async fn invoke(&self, input: &str) -> Result<String>;
}

/// Registry for available tools, ordered by registration
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new tool. Fails if the name is taken.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        self.register_arc(Arc::new(tool))
    }

    /// Register a shared tool. Fails if the name is taken.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.schema().name;
        if self.index.contains_key(&name) {
            return Err(AgentError::DuplicateTool(name));
        }
        tracing::debug!(tool = %name, "Registered tool");
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.index
            .get(name)
            .map(|&idx| Arc::clone(&self.tools[idx]))
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))
    }

    /// Tools in registration order
    pub fn list(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    /// Resolve and run a tool call.
    ///
    /// Unknown names return `ToolNotFound`; tool failures are returned as
    /// the tool's own error so the caller can decide how to surface them.
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let tool = self.get(&call.name)?;
        let output = tool.invoke(&call.input).await?;
        Ok(ToolResult::success(&call.name, output).with_id(call.id.clone()))
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools.iter().map(|t| t.schema()).collect()
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.schema().name).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// `name: description` lines for the system prompt
    pub fn prompt_section(&self) -> String {
        self.schemas()
            .iter()
            .map(|s| format!("{}: {}", s.name, s.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
