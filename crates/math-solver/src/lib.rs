//! # math-solver
//!
//! Text-to-math problem solver built on the agent-core ReAct loop.
//!
//! ## Tools
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Question: "What is the square root of 144?"                 │
//! ├──────────────────────────────────────────────────────────────┤
//! │  Wikipedia       facts and definitions   (KnowledgeSource)   │
//! │  Calculator      exact arithmetic        (model-backed)      │
//! │  Reasoning Tool  point-by-point solution (model-backed)      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Questions that are not about math get the fixed [`REFUSAL`] reply.

pub mod error;
pub mod knowledge;
pub mod svckit;

use std::sync::Arc;

use agent_core::{
    Agent, AgentConfig, GenerationOptions, LlmProvider, Tool, ToolRegistry,
};

pub use error::{Result, SolverError};
pub use knowledge::{Article, KnowledgeSource, StaticKnowledgeSource, WikipediaClient, WikipediaConfig};

/// Re-export tools for easy registration
pub mod tools {
    pub use crate::svckit::{CalculatorTool, ReasoningTool, WikipediaTool};
}

/// First assistant message of every session
pub const GREETING: &str =
    "Hey, I'm the Math Problem Solver. I can solve all your math problems. How can I help you?";

/// Reply for questions outside the solver's domain
pub const REFUSAL: &str = "I am sorry, I cannot help you with that.";

/// Instructions placed before the tool list in the agent prompt
pub const MATH_SOLVER_PROMPT: &str = "Answer the following questions as best you can. \
You solve mathematical questions and word problems: use the Calculator for exact arithmetic, \
Wikipedia for facts a problem depends on, and the Reasoning Tool to work a problem through \
point by point. If the question is not math related, do not use any tool and reply with \
'Final Answer: I am sorry, I cannot help you with that.'";

/// The built-in tools, in registration order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SolverTool {
    Wikipedia,
    Calculator,
    Reasoning,
}

impl SolverTool {
    pub const ALL: [SolverTool; 3] = [Self::Wikipedia, Self::Calculator, Self::Reasoning];

    /// Name the model uses in `Action:`
    pub fn name(self) -> &'static str {
        match self {
            Self::Wikipedia => svckit::WIKIPEDIA_NAME,
            Self::Calculator => svckit::CALCULATOR_NAME,
            Self::Reasoning => svckit::REASONING_NAME,
        }
    }

    fn build(
        self,
        provider: &Arc<dyn LlmProvider>,
        knowledge: &Arc<dyn KnowledgeSource>,
        options: &GenerationOptions,
    ) -> Arc<dyn Tool> {
        match self {
            Self::Wikipedia => Arc::new(tools::WikipediaTool::new(Arc::clone(knowledge))),
            Self::Calculator => Arc::new(tools::CalculatorTool::new(
                Arc::clone(provider),
                options.clone(),
            )),
            Self::Reasoning => Arc::new(tools::ReasoningTool::new(
                Arc::clone(provider),
                options.clone(),
            )),
        }
    }
}

/// Registry holding the three built-in tools
pub fn build_registry(
    provider: &Arc<dyn LlmProvider>,
    knowledge: &Arc<dyn KnowledgeSource>,
    options: &GenerationOptions,
) -> agent_core::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    for tool in SolverTool::ALL {
        registry.register_arc(tool.build(provider, knowledge, options))?;
    }
    Ok(registry)
}

/// Agent wired with the solver prompt and the built-in tools.
///
/// The same provider answers the agent and the model-backed tools.
pub fn solver_agent(
    provider: Arc<dyn LlmProvider>,
    knowledge: Arc<dyn KnowledgeSource>,
    mut config: AgentConfig,
) -> agent_core::Result<Agent> {
    config.system_prompt = MATH_SOLVER_PROMPT.into();
    let registry = build_registry(&provider, &knowledge, &config.generation)?;
    Ok(Agent::new(provider, Arc::new(registry), config))
}
