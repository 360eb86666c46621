//! ReAct-style agent loop for Rust.
//!
//! - `Agent` drives Thought/Action/Observation cycles until the model stops
//!   asking for tools, with an iteration budget and optional run timeout
//! - `ModelBackend` owns the conversation; `ChatSession` implements it over
//!   any `ChatModel` transport (`LlamaModel`, `OpenAiModel`)
//! - `ToolRegistry` maps names to free-text tools and turns unknown names
//!   into an in-band `"error in reasoning"` observation

pub mod agent;
pub mod error;
pub mod llm;
pub mod tools;

pub use agent::{
    Agent, AgentBuilder, AgentConfig, AgentEvent, ParsedAction, build_prompt, parse_action,
};
pub use error::{AgentError, ProviderError, ToolError};
pub use llm::{
    ChatModel, ChatSession, LlamaModel, LlamaModelConfig, Message, ModelBackend, OpenAiModel,
    OpenAiModelConfig, Role, trim_at_stop,
};
pub use tools::{
    CalculatorTool, Lookup, SearchTool, Tool, ToolName, ToolRegistry, ToolSpec,
    UNKNOWN_TOOL_OBSERVATION,
};
