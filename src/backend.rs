//! Remote generation capability and its chat-completions implementation

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::debug;

use crate::error::BackendError;
use crate::models::{ApiErrorBody, ChatMessage, ChatRequest, ChatResponse, GenerateRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Persona instructions sent ahead of every user prompt
pub const ASSISTANT_PREAMBLE: &str = "\
You are a helpful voice assistant. Answer accurately and concisely, in plain \
British English suitable for a general audience, within about 150 words. \
Structure the answer as: Overview (frame the question), Solution (actionable \
bullet points), Conclusion (the two or three key takeaways) and \
Recommendations. Avoid profanity and insensitive language.";

/// Anything that can turn a prompt into text
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn complete(&self, request: &GenerateRequest) -> Result<String, BackendError>;
}

/// Chat-completions client (`POST {base_url}/chat/completions`)
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    preamble: String,
}

impl OpenAiBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            preamble: ASSISTANT_PREAMBLE.to_string(),
        }
    }

    /// Replace the persona preamble; an empty string sends the prompt alone
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }

    fn compose(&self, prompt: &str) -> String {
        if self.preamble.is_empty() {
            prompt.to_string()
        } else {
            format!("{}\n{}", self.preamble, prompt)
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    async fn complete(&self, request: &GenerateRequest) -> Result<String, BackendError> {
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: self.compose(&request.prompt),
            }],
            options: &request.options,
        };

        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or_else(|_| format!("HTTP {status}"));
            debug!(%status, "chat completion rejected");
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Auth(message),
                _ => BackendError::Remote(message),
            });
        }

        let parsed: ChatResponse = res.json().await.map_err(transport_error)?;
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .unwrap_or_default())
    }
}

fn transport_error(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else if e.is_decode() {
        BackendError::Remote(format!("invalid response body: {e}"))
    } else {
        BackendError::Remote(format!("request failed: {e}"))
    }
}
