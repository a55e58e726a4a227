//! Service Kit - Agent Tools
//!
//! Domain-specific tools that implement `agent_core::Tool` for the math solver.

mod calculator;
mod reasoning;
mod wikipedia;

pub use calculator::{CalculatorTool, CALCULATOR_NAME};
pub use reasoning::{ReasoningTool, REASONING_NAME, REASONING_TEMPLATE};
pub use wikipedia::{WikipediaTool, NO_RESULT, WIKIPEDIA_NAME};
