//! Reasoning Loop
//!
//! Implements the ReAct (Reason + Act) pattern: the model thinks, picks a
//! tool, sees the observation, and repeats until it gives a final answer.
//!
//! ```text
//!            parse ok (tool)             observation
//! Thinking ───────────────────► Acting ───────────────► Thinking
//!    │  parse ok (final)                                   │
//!    ├────────────────► Done                               │
//!    │  parse fails twice in a row                         │
//!    ├────────────────► Failed                             │
//!    │  step budget spent                                  │
//!    └────────────────► Aborted ◄──────────────────────────┘
//! ```
//!
//! Every model call, including a corrective re-prompt, spends one step.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{AgentError, Result};
use crate::events::{emit, AgentEvent, EventSender};
use crate::message::{Conversation, Message};
use crate::provider::{GenerationOptions, LlmProvider};
use crate::react::{self, AgentAction, OBSERVATION_STOP};
use crate::tool::{Tool, ToolCall, ToolRegistry, ToolResult};

const DEFAULT_PREFIX: &str = "Answer the following questions as best you can.";

/// Agent configuration
#[derive(Clone, Debug)]
pub struct AgentConfig {
    /// Instructions placed before the tool list
    pub system_prompt: String,

    /// Maximum model calls per run
    pub max_iterations: usize,

    /// Wall-clock budget per run
    pub max_execution_time: Option<Duration>,

    /// Corrective re-prompts allowed per run of consecutive parse failures
    pub parse_retries: usize,

    pub generation: GenerationOptions,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_PREFIX.into(),
            max_iterations: 10,
            max_execution_time: Some(Duration::from_secs(60)),
            parse_retries: 1,
            generation: GenerationOptions::default(),
        }
    }
}

impl AgentConfig {
    /// Read `AGENT_MAX_ITERATIONS` and `AGENT_MAX_EXECUTION_SECS` (0 disables the time limit)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(max) = std::env::var("AGENT_MAX_ITERATIONS")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
        {
            config.max_iterations = max;
        }
        if let Some(secs) = std::env::var("AGENT_MAX_EXECUTION_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.max_execution_time = (secs > 0).then(|| Duration::from_secs(secs));
        }
        config
    }
}

/// Loop state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Thinking,
    Acting,
    Done,
    Failed,
    Aborted,
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentState::Thinking => "thinking",
            AgentState::Acting => "acting",
            AgentState::Done => "done",
            AgentState::Failed => "failed",
            AgentState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// One completed tool round
#[derive(Clone, Debug, Serialize)]
pub struct StepRecord {
    pub step: usize,
    pub thought: String,
    pub call: ToolCall,
    pub observation: ToolResult,
}

/// Outcome of a run that reached `Done`
#[derive(Clone, Debug)]
pub struct AgentRun {
    pub answer: String,
    pub steps: Vec<StepRecord>,
    pub model_calls: usize,
    pub parse_retries: usize,
    pub elapsed: Duration,
}

/// Per-run controls supplied by the host
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    pub cancel: CancellationToken,
    pub events: Option<EventSender>,
}

/// The main Agent struct
pub struct Agent {
    provider: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Self {
        Self {
            provider,
            tools,
            config,
        }
    }

    pub fn with_defaults(provider: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self::new(provider, tools, AgentConfig::default())
    }

    /// System prompt with format instructions and tool descriptions
    fn build_system_prompt(&self) -> String {
        react::format_instructions(
            &self.config.system_prompt,
            &self.tools.prompt_section(),
            &self.tools.names(),
        )
    }

    fn generation_options(&self) -> GenerationOptions {
        let mut options = self.config.generation.clone();
        if !options.stop_sequences.iter().any(|s| s == OBSERVATION_STOP) {
            options.stop_sequences.push(OBSERVATION_STOP.into());
        }
        options
    }

    /// Answer one question without cancellation or progress events
    pub async fn ask(&self, question: &str) -> Result<AgentRun> {
        self.run(question, RunOptions::default()).await
    }

    /// Answer one question.
    ///
    /// Credentials are checked before any model call. Cancellation and the
    /// time limit drop the in-flight run; nothing partial is returned.
    pub async fn run(&self, question: &str, options: RunOptions) -> Result<AgentRun> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::Session("question is empty".into()));
        }

        self.provider.validate_credentials()?;

        let started = Instant::now();
        let drive = self.drive(question, options.events.as_ref(), started);
        let limited = async {
            match self.config.max_execution_time {
                Some(limit) => tokio::time::timeout(limit, drive)
                    .await
                    .unwrap_or(Err(AgentError::TimeLimit(limit))),
                None => drive.await,
            }
        };

        let result = tokio::select! {
            biased;
            () = options.cancel.cancelled() => Err(AgentError::Cancelled),
            result = limited => result,
        };

        match &result {
            Ok(run) => tracing::info!(
                model_calls = run.model_calls,
                tool_calls = run.steps.len(),
                elapsed_ms = run.elapsed.as_millis() as u64,
                "Agent run finished"
            ),
            Err(AgentError::Cancelled) => tracing::info!("Agent run cancelled"),
            Err(AgentError::TimeLimit(limit)) => {
                tracing::warn!(state = %AgentState::Aborted, ?limit, "Agent run hit time limit");
            }
            Err(e) => tracing::warn!(error = %e, "Agent run ended without an answer"),
        }

        result
    }

    async fn drive(
        &self,
        question: &str,
        events: Option<&EventSender>,
        started: Instant,
    ) -> Result<AgentRun> {
        let options = self.generation_options();
        let mut scratchpad = Conversation::with_system_prompt(self.build_system_prompt());
        scratchpad.push(Message::user(format!("Question: {question}")));

        let mut state = AgentState::Thinking;
        let mut steps = Vec::new();
        let mut model_calls = 0usize;
        let mut parse_retries = 0usize;
        let mut consecutive_failures = 0usize;

        loop {
            if model_calls >= self.config.max_iterations {
                transition(&mut state, AgentState::Aborted);
                return Err(AgentError::MaxIterations(self.config.max_iterations));
            }
            model_calls += 1;
            emit(events, AgentEvent::Thinking { step: model_calls });

            let completion = self.provider.complete(scratchpad.messages(), &options).await?;
            scratchpad.push(Message::assistant(&completion.content).with_model(&completion.model));

            let step = match react::parse_step(&completion.content) {
                Ok(step) => {
                    consecutive_failures = 0;
                    step
                }
                Err(err) => {
                    consecutive_failures += 1;
                    emit(
                        events,
                        AgentEvent::ParseError {
                            step: model_calls,
                            message: err.to_string(),
                        },
                    );
                    if consecutive_failures > self.config.parse_retries {
                        transition(&mut state, AgentState::Failed);
                        return Err(err);
                    }
                    tracing::warn!(step = model_calls, error = %err, "Unparseable model output, re-prompting");
                    parse_retries += 1;
                    scratchpad.push(Message::user(react::corrective_prompt(&err, &self.tools.names())));
                    continue;
                }
            };

            match step.action {
                AgentAction::Final { answer } => {
                    transition(&mut state, AgentState::Done);
                    emit(events, AgentEvent::FinalAnswer { answer: answer.clone() });
                    return Ok(AgentRun {
                        answer,
                        steps,
                        model_calls,
                        parse_retries,
                        elapsed: started.elapsed(),
                    });
                }
                AgentAction::Tool { name, input } => {
                    transition(&mut state, AgentState::Acting);
                    let call = ToolCall::new(name, input);
                    tracing::debug!(tool = %call.name, input = %call.input, "Executing tool");
                    emit(
                        events,
                        AgentEvent::ToolCall {
                            step: model_calls,
                            thought: step.thought.clone(),
                            tool: call.name.clone(),
                            input: call.input.clone(),
                        },
                    );

                    let result = self.execute_tool(&call).await;
                    emit(
                        events,
                        AgentEvent::Observation {
                            step: model_calls,
                            tool: call.name.clone(),
                            output: result.output.clone(),
                            success: result.success,
                        },
                    );

                    scratchpad.push(
                        Message::tool(format!("Observation: {}", result.output), call.id.clone())
                            .with_name(&call.name),
                    );
                    steps.push(StepRecord {
                        step: model_calls,
                        thought: step.thought,
                        call,
                        observation: result,
                    });
                    transition(&mut state, AgentState::Thinking);
                }
            }
        }
    }

    /// Execute a tool call. Every failure becomes an observation.
    async fn execute_tool(&self, call: &ToolCall) -> ToolResult {
        match self.tools.execute(call).await {
            Ok(result) => result,
            Err(AgentError::ToolNotFound(name)) => {
                tracing::warn!(tool = %name, "Model asked for an unknown tool");
                ToolResult::failure(
                    &call.name,
                    format!(
                        "{} is not a valid tool, try one of [{}].",
                        name,
                        self.tools.names().join(", ")
                    ),
                )
                .with_id(call.id.clone())
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "Tool failed");
                ToolResult::failure(&call.name, format!("Error: {}", e)).with_id(call.id.clone())
            }
        }
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }
}

fn transition(state: &mut AgentState, next: AgentState) {
    tracing::trace!(from = %state, to = %next, "Agent state transition");
    *state = next;
}

/// Builder for Agent configuration
pub struct AgentBuilder {
    provider: Option<Arc<dyn LlmProvider>>,
    tools: Vec<Arc<dyn Tool>>,
    registry: Option<Arc<ToolRegistry>>,
    config: AgentConfig,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBuilder {
    pub fn new() -> Self {
        Self {
            provider: None,
            tools: Vec::new(),
            registry: None,
            config: AgentConfig::default(),
        }
    }

    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn tool<T: Tool + 'static>(mut self, tool: T) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Use a prepared registry; tools added with [`Self::tool`] are ignored
    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.registry = Some(tools);
        self
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = prompt.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.generation.model = model.into();
        self
    }

    pub fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn max_iterations(mut self, max: usize) -> Self {
        self.config.max_iterations = max;
        self
    }

    pub fn max_execution_time(mut self, limit: Option<Duration>) -> Self {
        self.config.max_execution_time = limit;
        self
    }

    pub fn build(self) -> Result<Agent> {
        let provider = self
            .provider
            .ok_or_else(|| AgentError::Config("Provider is required".into()))?;

        let tools = match self.registry {
            Some(registry) => registry,
            None => {
                let mut registry = ToolRegistry::new();
                for tool in self.tools {
                    registry.register_arc(tool)?;
                }
                Arc::new(registry)
            }
        };

        Ok(Agent::new(provider, tools, self.config))
    }
}
