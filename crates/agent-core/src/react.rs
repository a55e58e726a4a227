//! ReAct Output Grammar
//!
//! Model output is untrusted text. Each response must take one of two shapes:
//!
//! ```text
//! Thought: <free text>
//! Action: <tool name>
//! Action Input: <tool input>
//! ```
//!
//! or
//!
//! ```text
//! Thought: I now know the final answer
//! Final Answer: <answer>
//! ```
//!
//! Anything else is a [`AgentError::Parse`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};

pub const FINAL_ANSWER_MARKER: &str = "Final Answer:";
pub const OBSERVATION_MARKER: &str = "Observation:";

/// Stop sequence that keeps the model from inventing its own observations
pub const OBSERVATION_STOP: &str = "\nObservation:";

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
        .expect("action regex is valid")
});

static ACTION_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Action\s*\d*\s*:").expect("action regex is valid"));

/// What the model decided to do next
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AgentAction {
    Tool { name: String, input: String },
    Final { answer: String },
}

/// One parsed model decision
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStep {
    pub thought: String,
    pub action: AgentAction,
}

impl AgentStep {
    /// Tool name, or `"final"` for a final answer
    pub fn action_name(&self) -> &str {
        match &self.action {
            AgentAction::Tool { name, .. } => name,
            AgentAction::Final { .. } => "final",
        }
    }

    /// Tool input, or the answer text for a final answer
    pub fn action_input(&self) -> &str {
        match &self.action {
            AgentAction::Tool { input, .. } => input,
            AgentAction::Final { answer } => answer,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self.action, AgentAction::Final { .. })
    }
}

/// Parse one model response into an [`AgentStep`]
pub fn parse_step(text: &str) -> Result<AgentStep> {
    // Anything after a model-written observation was never executed
    let text = match text.find(OBSERVATION_STOP) {
        Some(idx) => &text[..idx],
        None => text,
    };
    let has_final = text.contains(FINAL_ANSWER_MARKER);
    let action = ACTION_RE.captures(text);

    match (action, has_final) {
        (Some(_), true) => Err(AgentError::Parse(
            "Response contains both a final answer and an action".into(),
        )),
        (Some(caps), false) => {
            let name = caps.get(1).map_or("", |m| m.as_str()).trim();
            if name.is_empty() {
                return Err(AgentError::Parse("Action names no tool".into()));
            }
            let input = clean_input(caps.get(2).map_or("", |m| m.as_str()));
            let start = caps.get(0).map_or(0, |m| m.start());
            Ok(AgentStep {
                thought: extract_thought(&text[..start]),
                action: AgentAction::Tool {
                    name: name.to_string(),
                    input,
                },
            })
        }
        (None, true) => {
            let idx = text.rfind(FINAL_ANSWER_MARKER).unwrap_or(0);
            let answer = text[idx + FINAL_ANSWER_MARKER.len()..].trim();
            if answer.is_empty() {
                return Err(AgentError::Parse("Final Answer is empty".into()));
            }
            Ok(AgentStep {
                thought: extract_thought(&text[..idx]),
                action: AgentAction::Final {
                    answer: answer.to_string(),
                },
            })
        }
        (None, false) => {
            if !ACTION_ONLY_RE.is_match(text) {
                Err(AgentError::Parse(
                    "Invalid Format: Missing 'Action:' after 'Thought:'".into(),
                ))
            } else {
                Err(AgentError::Parse(
                    "Invalid Format: Missing 'Action Input:' after 'Action:'".into(),
                ))
            }
        }
    }
}

/// Message sent back to the model after an unparseable response
pub fn corrective_prompt(error: &AgentError, tool_names: &[String]) -> String {
    format!(
        "Invalid or incomplete response ({error}).\n\
         Reply using exactly this format:\n\
         Thought: <your reasoning>\n\
         Action: <one of [{tools}]>\n\
         Action Input: <the input to the action>\n\
         or, if you know the answer:\n\
         Thought: I now know the final answer\n\
         Final Answer: <the answer>",
        tools = tool_names.join(", "),
    )
}

/// Format instructions appended to the agent's system prompt
pub fn format_instructions(prefix: &str, tool_lines: &str, tool_names: &[String]) -> String {
    format!(
        "{prefix}\n\n\
         You have access to the following tools:\n\n\
         {tool_lines}\n\n\
         Use the following format:\n\n\
         Question: the input question you must answer\n\
         Thought: you should always think about what to do\n\
         Action: the action to take, should be one of [{names}]\n\
         Action Input: the input to the action\n\
         Observation: the result of the action\n\
         ... (this Thought/Action/Action Input/Observation can repeat N times)\n\
         Thought: I now know the final answer\n\
         Final Answer: the final answer to the original input question\n\n\
         Begin!",
        names = tool_names.join(", "),
    )
}

fn clean_input(raw: &str) -> String {
    let raw = match raw.find(OBSERVATION_MARKER) {
        Some(idx) => &raw[..idx],
        None => raw,
    };
    raw.trim().trim_matches('"').trim().to_string()
}

fn extract_thought(prefix: &str) -> String {
    let prefix = prefix.trim();
    prefix
        .strip_prefix("Thought:")
        .unwrap_or(prefix)
        .trim()
        .to_string()
}
