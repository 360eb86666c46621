use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::llm::{ChatModel, Message, Role};

const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";
const DEFAULT_STOP: &str = "\n\n";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Runtime configuration for [`LlamaModel`].
#[derive(Debug, Clone)]
pub struct LlamaModelConfig {
    /// Base URL of the inference server.
    pub api_base_url: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling threshold.
    pub top_p: f32,
    /// Cap on generated tokens; `None` lets the server decide.
    pub max_gen_len: Option<u32>,
    /// End-of-turn marker, enforced on the client by truncation.
    pub stop: String,
    /// Per-generation request timeout.
    pub timeout: Duration,
}

impl Default for LlamaModelConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            temperature: 0.6,
            top_p: 0.9,
            max_gen_len: None,
            stop: DEFAULT_STOP.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl LlamaModelConfig {
    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop = stop.into();
        self
    }
}

/// Batched chat-completion transport for a self-hosted Llama 2 server.
///
/// Each turn is sent as a batch holding a single dialog. The server has no
/// notion of stop sequences, so the reply is cut at the first occurrence of
/// [`LlamaModelConfig::stop`] before it is returned.
#[derive(Debug, Clone)]
pub struct LlamaModel {
    client: Client,
    config: LlamaModelConfig,
}

impl LlamaModel {
    pub fn new(config: LlamaModelConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ProviderError::Unavailable(err.to_string()))?;

        Ok(Self { client, config })
    }

    /// Reads the server location from `LLAMA_API_BASE_URL`.
    pub fn from_env(stop: impl Into<String>) -> Result<Self, ProviderError> {
        let config = LlamaModelConfig {
            api_base_url: std::env::var("LLAMA_API_BASE_URL").ok(),
            ..LlamaModelConfig::default()
        }
        .with_stop(stop);
        Self::new(config)
    }

    pub fn config(&self) -> &LlamaModelConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat_completion")
    }
}

#[async_trait]
impl ChatModel for LlamaModel {
    async fn invoke(&self, messages: &[Message]) -> Result<Message, ProviderError> {
        let request = build_request(messages, &self.config);

        let response = self
            .client
            .post(self.endpoint())
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::from_transport(err, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Unavailable(if body.is_empty() {
                format!("llama request failed ({status})")
            } else {
                format!("llama request failed ({status}): {body}")
            }));
        }

        let payload = response
            .json::<Vec<LlamaCompletion>>()
            .await
            .map_err(|err| ProviderError::from_transport(err, self.config.timeout))?;

        normalize_response(payload, &self.config.stop)
    }
}

#[derive(Debug, Serialize)]
struct LlamaChatRequest<'a> {
    dialogs: Vec<&'a [Message]>,
    max_gen_len: Option<u32>,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct LlamaCompletion {
    generation: Option<LlamaGeneration>,
}

#[derive(Debug, Deserialize)]
struct LlamaGeneration {
    role: Role,
    content: Option<String>,
}

fn build_request<'a>(messages: &'a [Message], config: &LlamaModelConfig) -> LlamaChatRequest<'a> {
    LlamaChatRequest {
        dialogs: vec![messages],
        max_gen_len: config.max_gen_len,
        temperature: config.temperature,
        top_p: config.top_p,
    }
}

fn normalize_response(
    completions: Vec<LlamaCompletion>,
    stop: &str,
) -> Result<Message, ProviderError> {
    let completion = completions
        .into_iter()
        .next_back()
        .ok_or_else(|| ProviderError::Protocol("llama response has no completions".to_string()))?;

    let generation = completion.generation.ok_or_else(|| {
        ProviderError::Protocol("llama completion missing generation".to_string())
    })?;

    let content = generation.content.ok_or_else(|| {
        ProviderError::Protocol("llama generation missing content".to_string())
    })?;

    Ok(Message::new(generation.role, content).truncated_at(stop))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::llm::{ChatSession, ModelBackend};

    fn model_for(server: &MockServer, stop: &str) -> LlamaModel {
        let config = LlamaModelConfig {
            api_base_url: Some(server.uri()),
            ..LlamaModelConfig::default()
        }
        .with_stop(stop);
        LlamaModel::new(config).expect("client builds")
    }

    #[test]
    fn build_request_wraps_history_in_single_dialog() {
        let messages = vec![
            Message::system("rules"),
            Message::user("Question: 2+2"),
        ];
        let config = LlamaModelConfig {
            max_gen_len: Some(256),
            ..LlamaModelConfig::default()
        };

        let value = serde_json::to_value(build_request(&messages, &config)).expect("serializes");

        assert_eq!(value["dialogs"].as_array().map(Vec::len), Some(1));
        assert_eq!(value["dialogs"][0][0]["role"], "system");
        assert_eq!(value["dialogs"][0][1]["content"], "Question: 2+2");
        assert_eq!(value["max_gen_len"], 256);
        assert!((value["top_p"].as_f64().unwrap_or_default() - 0.9).abs() < 1e-6);
    }

    #[test]
    fn unset_generation_cap_serializes_as_null() {
        let messages = vec![Message::user("hi")];
        let value = serde_json::to_value(build_request(&messages, &LlamaModelConfig::default()))
            .expect("serializes");
        assert!(value["max_gen_len"].is_null());
    }

    #[tokio::test]
    async fn invoke_uses_last_completion_and_truncates_at_stop() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat_completion"))
            .and(body_partial_json(json!({"temperature": 0.6})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"generation": {"role": "assistant", "content": "ignored"}},
                {"generation": {
                    "role": "assistant",
                    "content": "Action: search\nAction Input: weather\nObservation: made up"
                }}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let reply = model_for(&server, "Observation:")
            .invoke(&[Message::user("Question: weather?")])
            .await
            .expect("invoke succeeds");

        assert_eq!(
            reply,
            Message::assistant("Action: search\nAction Input: weather\n")
        );
    }

    #[tokio::test]
    async fn session_stores_truncated_reply() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat_completion"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"generation": {
                    "role": "assistant",
                    "content": "Action: calculator\nAction Input: 2+2\nObservation: 5"
                }}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let mut session = ChatSession::new(model_for(&server, "Observation:"));
        session
            .generate("Question: 2+2?")
            .await
            .expect("generate succeeds");

        assert_eq!(
            session.history(),
            &[
                Message::user("Question: 2+2?"),
                Message::assistant("Action: calculator\nAction Input: 2+2\n"),
            ]
        );
    }

    #[tokio::test]
    async fn empty_completion_list_is_a_protocol_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat_completion"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let err = model_for(&server, "\n\n")
            .invoke(&[Message::user("hi")])
            .await
            .expect_err("must fail");

        match err {
            ProviderError::Protocol(message) => assert!(message.contains("no completions")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_backend_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat_completion"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading weights"))
            .mount(&server)
            .await;

        let err = model_for(&server, "\n\n")
            .invoke(&[Message::user("hi")])
            .await
            .expect_err("must fail");

        match err {
            ProviderError::Unavailable(message) => assert!(message.contains("loading weights")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
