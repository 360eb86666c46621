mod parser;
mod prompt;

use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures_util::{Stream, StreamExt};
use tracing::{info, warn};

use crate::error::AgentError;
use crate::llm::{ChatModel, ChatSession, Message, ModelBackend};
use crate::tools::{CalculatorTool, SearchTool, Tool, ToolRegistry};

pub use parser::{ParsedAction, parse_action};
pub use prompt::build_prompt;

const OBSERVATION_PREFIX: &str = "Observation: ";

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Tool calls allowed per run before the agent gives up.
    pub max_iterations: u32,
    /// Wall-clock budget for a whole run.
    pub timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    Generation { message: Message },
    Action { name: String, input: String },
    Observation { content: String },
    FinalAnswer { message: Message },
}

#[derive(Default)]
pub struct AgentBuilder {
    backend: Option<Box<dyn ModelBackend>>,
    tools: Vec<(String, Arc<dyn Tool>)>,
    config: AgentConfig,
}

impl AgentBuilder {
    pub fn backend<B>(mut self, backend: B) -> Self
    where
        B: ModelBackend + 'static,
    {
        self.backend = Some(Box::new(backend));
        self
    }

    /// Wraps a transport in a fresh [`ChatSession`].
    pub fn model<M>(self, model: M) -> Self
    where
        M: ChatModel + 'static,
    {
        self.backend(ChatSession::new(model))
    }

    pub fn tool<T>(mut self, name: impl Into<String>, tool: T) -> Self
    where
        T: Tool + 'static,
    {
        self.tools.push((name.into(), Arc::new(tool)));
        self
    }

    /// Registers `calculator` and `search`, in that order.
    pub fn default_tools(self) -> Self {
        self.tool("calculator", CalculatorTool::new())
            .tool("search", SearchTool::new())
    }

    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn max_iterations(mut self, max_iterations: u32) -> Self {
        self.config.max_iterations = max_iterations;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<Agent, AgentError> {
        let Some(backend) = self.backend else {
            return Err(AgentError::Config(
                "agent backend must be configured via AgentBuilder::backend(...) or ::model(...)"
                    .to_string(),
            ));
        };

        if self.config.max_iterations == 0 {
            return Err(AgentError::Config(
                "max_iterations must be at least 1".to_string(),
            ));
        }

        let mut registry = ToolRegistry::new();
        for (name, tool) in self.tools {
            registry.register_shared(name, tool)?;
        }

        Ok(Agent {
            backend,
            registry,
            config: self.config,
        })
    }
}

/// ReAct loop over one backend and one tool registry.
///
/// The agent keeps no conversation state of its own; the backend's history
/// holds every turn of every run until [`Agent::clear_history`] is called.
pub struct Agent {
    backend: Box<dyn ModelBackend>,
    registry: ToolRegistry,
    config: AgentConfig,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    /// Agent over `backend` with the calculator and search tools.
    pub fn with_default_tools<B>(backend: B) -> Result<Self, AgentError>
    where
        B: ModelBackend + 'static,
    {
        Self::builder().backend(backend).default_tools().build()
    }

    pub fn backend(&self) -> &dyn ModelBackend {
        self.backend.as_ref()
    }

    pub fn backend_mut(&mut self) -> &mut dyn ModelBackend {
        self.backend.as_mut()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn clear_history(&mut self) {
        self.backend.clear_history();
    }

    /// The opening user turn a run would send for `question`.
    pub fn prompt(&self, question: &str) -> String {
        build_prompt(&self.registry, question)
    }

    /// Drives the loop to a final answer and returns the last assistant turn.
    pub async fn run(&mut self, question: impl Into<String>) -> Result<Message, AgentError> {
        let question = question.into();
        let timeout = self.config.timeout;
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.drive(question))
                .await
                .map_err(|_| AgentError::Timeout(limit))?,
            None => self.drive(question).await,
        }
    }

    async fn drive(&mut self, question: String) -> Result<Message, AgentError> {
        let stream = self.run_stream(question);
        futures_util::pin_mut!(stream);

        let mut final_answer = None;
        while let Some(event) = stream.next().await {
            if let AgentEvent::FinalAnswer { message } = event? {
                final_answer = Some(message);
            }
        }

        final_answer.ok_or(AgentError::MissingFinalAnswer)
    }

    /// Same loop as [`Agent::run`], reporting every generation, action and
    /// observation as it happens. The run-level timeout does not apply here.
    pub fn run_stream(
        &mut self,
        question: impl Into<String>,
    ) -> impl Stream<Item = Result<AgentEvent, AgentError>> + '_ {
        let question = question.into();

        try_stream! {
            info!(%question, "agent run started");
            let prompt = build_prompt(&self.registry, &question);
            let mut message = self.backend.generate(&prompt).await?;
            yield AgentEvent::Generation { message: message.clone() };

            let mut dispatched = 0_u32;
            loop {
                let parsed = parse_action(&message);
                let action = match parsed.action {
                    Some(action) => action,
                    None => {
                        info!(tool_calls = dispatched, "agent reached a final answer");
                        yield AgentEvent::FinalAnswer { message };
                        return;
                    }
                };

                if dispatched >= self.config.max_iterations {
                    let max_iterations = self.config.max_iterations;
                    warn!(max_iterations, %action, "iteration budget exhausted");
                    let note = format!("[agent stopped: iteration budget of {max_iterations} exhausted]");
                    Err::<(), AgentError>(AgentError::IterationBudgetExceeded {
                        max_iterations,
                        last_message: Box::new(message.clone().with_note(&note)),
                    })?;
                }

                let input = parsed.input.unwrap_or_default();
                info!(%action, %input, "action detected");
                yield AgentEvent::Action {
                    name: action.clone(),
                    input: input.clone(),
                };

                let observation = self.registry.dispatch(&action, &input);
                dispatched += 1;
                info!(%observation, "observation");
                yield AgentEvent::Observation {
                    content: observation.clone(),
                };

                message = self
                    .backend
                    .generate(&format!("{OBSERVATION_PREFIX}{observation}"))
                    .await?;
                yield AgentEvent::Generation { message: message.clone() };
            }
        }
    }
}
