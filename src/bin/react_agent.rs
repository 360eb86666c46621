use std::env;
use std::error::Error;

use futures_util::StreamExt;
use react_agent::{Agent, AgentEvent, ChatSession, LlamaModel, OpenAiModel};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_QUESTION: &str = "What was the high temperature in SF yesterday in Celsius?";
const STOP: &str = "Observation:";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "react_agent=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let question = env::args().skip(1).collect::<Vec<_>>().join(" ");
    let question = if question.trim().is_empty() {
        DEFAULT_QUESTION.to_string()
    } else {
        question
    };

    let backend = env::var("REACT_BACKEND").unwrap_or_else(|_| "llama".to_string());
    let mut agent = match backend.as_str() {
        "openai" => {
            let model = OpenAiModel::from_env(env::var("OPENAI_MODEL").ok(), STOP)?;
            Agent::with_default_tools(ChatSession::new(model))?
        }
        "llama" => Agent::with_default_tools(ChatSession::new(LlamaModel::from_env(STOP)?))?,
        other => {
            return Err(format!("unknown REACT_BACKEND: {other} (expected llama or openai)").into());
        }
    };

    println!("Question: {question}");

    let stream = agent.run_stream(question);
    futures_util::pin_mut!(stream);

    while let Some(event) = stream.next().await {
        match event? {
            AgentEvent::Generation { message } => println!("{message}"),
            AgentEvent::Action { name, input } => println!("Action detected: {name}({input})"),
            AgentEvent::Observation { content } => println!("Observation: {content}"),
            AgentEvent::FinalAnswer { message } => {
                let answer = message.final_answer().unwrap_or_else(|| message.content().to_string());
                println!("\nfinal:\n{answer}");
            }
        }
    }

    Ok(())
}
