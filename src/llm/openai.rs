use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ProviderError;
use crate::llm::{ChatModel, Message, Role};

const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4";
const DEFAULT_STOP: &str = "\n\n";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct OpenAiModelConfig {
    pub api_key: String,
    pub model: String,
    pub api_base_url: Option<String>,
    /// Sent with every request; the server stops generating at this marker.
    pub stop: String,
    pub timeout: Duration,
}

impl OpenAiModelConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            api_base_url: None,
            stop: DEFAULT_STOP.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop = stop.into();
        self
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiModel {
    client: Client,
    config: OpenAiModelConfig,
}

impl OpenAiModel {
    pub fn new(config: OpenAiModelConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ProviderError::Unavailable(err.to_string()))?;

        Ok(Self { client, config })
    }

    /// Reads `OPENAI_API_KEY` and the optional `OPENAI_API_BASE_URL`.
    /// Falls back to `gpt-4` when `model` is `None`.
    pub fn from_env(
        model: Option<String>,
        stop: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| ProviderError::Unavailable("OPENAI_API_KEY is not set".to_string()))?;

        let mut config =
            OpenAiModelConfig::new(api_key, model.unwrap_or_else(|| DEFAULT_MODEL.to_string()))
                .with_stop(stop);
        config.api_base_url = std::env::var("OPENAI_API_BASE_URL").ok();
        Self::new(config)
    }

    pub fn config(&self) -> &OpenAiModelConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        let base = self
            .config
            .api_base_url
            .as_deref()
            .unwrap_or(DEFAULT_API_BASE_URL)
            .trim_end_matches('/');
        format!("{base}/chat/completions")
    }
}

#[async_trait]
impl ChatModel for OpenAiModel {
    async fn invoke(&self, messages: &[Message]) -> Result<Message, ProviderError> {
        let request = OpenAiChatRequest {
            model: &self.config.model,
            messages,
            stop: (!self.config.stop.is_empty()).then_some(self.config.stop.as_str()),
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| ProviderError::from_transport(err, self.config.timeout))?;

        if !response.status().is_success() {
            return Err(ProviderError::Unavailable(extract_api_error(response).await));
        }

        let payload = response
            .json::<OpenAiChatResponse>()
            .await
            .map_err(|err| ProviderError::from_transport(err, self.config.timeout))?;

        normalize_response(payload)
    }
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    role: Role,
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiErrorEnvelope {
    error: OpenAiApiError,
}

#[derive(Debug, Deserialize)]
struct OpenAiApiError {
    message: Option<String>,
    #[serde(rename = "type")]
    type_: Option<String>,
}

fn normalize_response(response: OpenAiChatResponse) -> Result<Message, ProviderError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Protocol("openai response missing choices".to_string()))?;

    let message = choice.message.ok_or_else(|| {
        ProviderError::Protocol("openai response missing choice message".to_string())
    })?;

    let content = message.content.ok_or_else(|| {
        ProviderError::Protocol("openai response message has no content".to_string())
    })?;

    Ok(Message::new(message.role, content))
}

async fn extract_api_error(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    if let Ok(parsed) = serde_json::from_str::<OpenAiErrorEnvelope>(&body) {
        let error_type = parsed
            .error
            .type_
            .unwrap_or_else(|| status.to_string().to_uppercase());
        let message = parsed
            .error
            .message
            .unwrap_or_else(|| "unknown openai api error".to_string());

        return format!("openai api error {} {error_type}: {message}", status.as_u16());
    }

    if body.is_empty() {
        format!("openai api request failed ({status})")
    } else {
        format!("openai api request failed ({status}): {body}")
    }
}
