//! Reasoning Tool
//!
//! One templated model call that works a question through step by step.

use std::sync::Arc;

use agent_core::{
    AgentError, GenerationOptions, LlmProvider, Result as CoreResult, Tool, ToolSchema,
};
use async_trait::async_trait;

use crate::error::SolverError;

pub const REASONING_NAME: &str = "Reasoning Tool";

const REASONING_DESCRIPTION: &str = "A tool for answering logic-based and reasoning questions.";

/// Instruction template; `{question}` is replaced with the action input
pub const REASONING_TEMPLATE: &str = "
You are an agent tasked for solving users mathematical questions.
Logically arrive at the solution and provide a detailed explanation and display it point by point for the question below.
If the question is not math related, please respond with 'I am sorry, I cannot help you with that.'
Question:{question}
Answer:
";

/// Tool for step-by-step worked answers
pub struct ReasoningTool {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
}

impl ReasoningTool {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions) -> Self {
        Self { provider, options }
    }

    pub fn render(question: &str) -> String {
        REASONING_TEMPLATE.replace("{question}", question)
    }
}

#[async_trait]
impl Tool for ReasoningTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: REASONING_NAME.into(),
            description: REASONING_DESCRIPTION.into(),
            category: Some("reasoning".into()),
        }
    }

    async fn invoke(&self, input: &str) -> CoreResult<String> {
        let question = input.trim();
        if question.is_empty() {
            return Err(SolverError::EmptyInput(REASONING_NAME).into());
        }

        self.provider
            .ask(&Self::render(question), &self.options)
            .await
            .map_err(|e| AgentError::ToolExecution(format!("{REASONING_NAME} failed: {e}")))
    }
}
