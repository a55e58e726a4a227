//! Calculator Tool
//!
//! Model-backed evaluator for arithmetic expressions.
//!
//! The model's reply is handed back untouched, whitespace included. A reply
//! with no text at all is the one exception: it becomes a tool error so the
//! agent sees a failure instead of a blank observation.

use std::sync::Arc;

use agent_core::{
    AgentError, GenerationOptions, LlmProvider, Result as CoreResult, Tool, ToolSchema,
};
use async_trait::async_trait;

use crate::error::SolverError;

pub const CALCULATOR_NAME: &str = "Calculator";

const CALCULATOR_DESCRIPTION: &str = "Use this tool to compute exact results for arithmetic \
expressions. Supports +, -, *, /, **, and parentheses. Input must be a string containing a \
valid math expression, and the tool returns the evaluated numeric result. Use it whenever \
precise mathematical computation is needed.";

const CALCULATOR_PROMPT: &str = "Translate the math problem below into a single arithmetic \
expression using only numbers, +, -, *, /, ** and parentheses, evaluate it exactly, and reply \
with only the numeric result.

Problem: ";

/// Tool that asks the model to evaluate an expression
pub struct CalculatorTool {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl CalculatorTool {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        // Arithmetic should not be sampled
        let options = GenerationOptions {
            temperature: 0.0,
            ..options
        };
        Self { provider, options }
    }
}

#[async_trait]
impl Tool for CalculatorTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: CALCULATOR_NAME.into(),
            description: CALCULATOR_DESCRIPTION.into(),
            category: Some("math".into()),
        }
    }

    async fn invoke(&self, input: &str) -> CoreResult<String> {
        let expression = input.trim();
        if expression.is_empty() {
            return Err(SolverError::EmptyInput(CALCULATOR_NAME).into());
        }

        let prompt = format!("{CALCULATOR_PROMPT}{expression}");
        let reply = self
            .provider
            .ask(&prompt, &self.options)
            .await
            .map_err(|e| AgentError::ToolExecution(format!("{CALCULATOR_NAME} failed: {e}")))?;
        if reply.trim().is_empty() {
            return Err(SolverError::EmptyCompletion.into());
        }

        tracing::debug!(expression, result = %reply, "Calculator evaluated");
        Ok(reply)
    }
}
