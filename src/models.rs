use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::error::BackendError;

// A single generation request as handed to a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    // Extra sampling parameters, passed through untouched
    #[serde(default)]
    pub options: Map<String, Value>,
}

// Chat-completions wire format (request)
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub model: &'a str,
    pub messages: Vec<ChatMessage>,
    #[serde(flatten)]
    pub options: &'a Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

// Chat-completions wire format (response)
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

// Error body returned by the API: {"error": {"message": "..."}}
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
}

// HTTP front-end request: {"question": "..."}
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QuestionRequest {
    pub question: String,
}

// HTTP front-end response: {"response": "..."}
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct QuestionResponse {
    pub response: String,
}

// Queued job - holds request + response channel
pub struct DispatchedRequest {
    pub request: GenerateRequest,                                    // original request
    pub response_tx: oneshot::Sender<Result<String, BackendError>>, // one-time channel to send back the text
}
