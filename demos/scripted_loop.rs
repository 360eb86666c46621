use std::collections::VecDeque;
use std::error::Error;
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::StreamExt;
use react_agent::{Agent, AgentEvent, ChatModel, Message, ProviderError};

/// Replays canned assistant turns, cut at the stop marker the way a backend
/// without native stop support would be.
struct ScriptedModel {
    responses: Mutex<VecDeque<&'static str>>,
}

impl ScriptedModel {
    fn new(responses: Vec<&'static str>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(responses)),
        }
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn invoke(&self, _messages: &[Message]) -> Result<Message, ProviderError> {
        let mut guard = self.responses.lock().expect("lock poisoned");
        let content = guard.pop_front().ok_or_else(|| {
            ProviderError::Protocol("scripted model exhausted responses".to_string())
        })?;
        Ok(Message::assistant(react_agent::trim_at_stop(
            content,
            "Observation:",
        )))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let model = ScriptedModel::new(vec![
        "I need yesterday's high in SF.\nAction: search\nAction Input: SF high temperature yesterday\nObservation: (hallucinated)",
        "The high was 56 °F; convert to Celsius.\nAction: calculator\nAction Input: (56 - 32) * 5 / 9\n",
        "Thought: I now know the final answer\nFinal Answer: roughly 13.3 °C",
    ]);

    let mut agent = Agent::builder()
        .model(model)
        .default_tools()
        .max_iterations(4)
        .build()?;

    {
        let stream = agent.run_stream("What was the high temperature in SF yesterday in Celsius?");
        futures_util::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            match event? {
                AgentEvent::Generation { message } => println!("{message}"),
                AgentEvent::Action { name, input } => println!("action: {name}({input})"),
                AgentEvent::Observation { content } => println!("observation: {content}"),
                AgentEvent::FinalAnswer { message } => {
                    println!("final: {}", message.final_answer().unwrap_or_default())
                }
            }
        }
    }

    println!("history: {} turns", agent.backend().history().len());
    Ok(())
}
