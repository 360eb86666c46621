mod llama;
mod openai;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ProviderError;

pub use llama::{LlamaModel, LlamaModelConfig};
pub use openai::{OpenAiModel, OpenAiModelConfig};

const FINAL_ANSWER_PREFIX: &str = "Final Answer:";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn of a conversation.
///
/// `content` is the text exactly as the backend surfaced it, after any
/// stop-sequence truncation the backend applies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    role: Role,
    content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Text following the last line that starts with `Final Answer:`, if any.
    pub fn final_answer(&self) -> Option<String> {
        let lines = self.content.split('\n').collect::<Vec<_>>();
        let index = lines
            .iter()
            .rposition(|line| line.trim_start().starts_with(FINAL_ANSWER_PREFIX))?;

        let first = lines[index]
            .trim_start()
            .strip_prefix(FINAL_ANSWER_PREFIX)
            .unwrap_or_default();
        let mut answer = first.to_string();
        for line in &lines[index + 1..] {
            answer.push('\n');
            answer.push_str(line);
        }

        Some(answer.trim().to_string())
    }

    pub(crate) fn truncated_at(mut self, stop: &str) -> Self {
        let keep = trim_at_stop(&self.content, stop).len();
        self.content.truncate(keep);
        self
    }

    pub(crate) fn with_note(mut self, note: &str) -> Self {
        if !self.content.is_empty() && !self.content.ends_with('\n') {
            self.content.push('\n');
        }
        self.content.push_str(note);
        self
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] - {}",
            self.role.as_str().to_uppercase(),
            self.content
        )
    }
}

/// Cuts `content` at the first occurrence of `stop`. An empty stop sequence
/// leaves the content untouched.
pub fn trim_at_stop<'a>(content: &'a str, stop: &str) -> &'a str {
    if stop.is_empty() {
        return content;
    }
    content.find(stop).map_or(content, |idx| &content[..idx])
}

/// Stateless transport: turns a full conversation into the next assistant turn.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> Result<Message, ProviderError>;
}

/// Conversational capability driven by the agent loop.
#[async_trait]
pub trait ModelBackend: Send {
    /// Appends `user_text` as a user turn, asks the model for the next turn
    /// and records it.
    async fn generate(&mut self, user_text: &str) -> Result<Message, ProviderError>;

    fn add_system_prompt(&mut self, prompt: &str);

    fn clear_history(&mut self);

    fn history(&self) -> &[Message];
}

/// Owns the conversation history for one transport.
#[derive(Debug)]
pub struct ChatSession<M> {
    model: M,
    history: Vec<Message>,
}

impl<M: ChatModel> ChatSession<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            history: Vec::new(),
        }
    }

    pub fn model(&self) -> &M {
        &self.model
    }
}

#[async_trait]
impl<M: ChatModel> ModelBackend for ChatSession<M> {
    async fn generate(&mut self, user_text: &str) -> Result<Message, ProviderError> {
        if user_text.trim().is_empty() {
            return Err(ProviderError::EmptyInput);
        }

        self.history.push(Message::user(user_text));

        let reply = self.model.invoke(&self.history).await?;
        if reply.role() != Role::Assistant {
            return Err(ProviderError::Protocol(format!(
                "expected an assistant turn, got {}",
                reply.role().as_str()
            )));
        }

        debug!(turns = self.history.len() + 1, "{reply}");
        self.history.push(reply.clone());
        Ok(reply)
    }

    fn add_system_prompt(&mut self, prompt: &str) {
        self.history.push(Message::system(prompt));
    }

    fn clear_history(&mut self) {
        self.history.clear();
    }

    fn history(&self) -> &[Message] {
        &self.history
    }
}
