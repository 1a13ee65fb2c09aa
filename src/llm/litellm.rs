//! LiteLLM-compatible client implementation for examforge.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (a LiteLLM
//! proxy, OpenRouter, or a vendor gateway) and returns the raw completion.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::LlmError;

/// Default API base when none is configured.
pub const DEFAULT_API_BASE: &str = "https://openrouter.ai/api/v1";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";

/// Upper bound on a single HTTP exchange; per-call timeouts are applied above this.
const HTTP_TIMEOUT_SECS: u64 = 120;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier; empty means the client's default model.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling parameter (0.0 - 1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl GenerationRequest {
    /// Create a new generation request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    /// Content of the system message, if the request carries one.
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == "system")
            .map(|m| m.content.as_str())
    }

    /// Content of the last user message, if any.
    pub fn user_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Unique identifier for this response.
    pub id: String,
    /// Model that generated this response.
    pub model: String,
    /// Generated completions.
    pub choices: Vec<CompletionChoice>,
    /// Token usage statistics.
    pub usage: Usage,
}

impl GenerationResponse {
    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }

    /// Build a single-completion response; used by in-process providers.
    pub fn from_text(model: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.into(),
            choices: vec![CompletionChoice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        }
    }
}

/// A single generated completion from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionChoice {
    /// Index of this choice in the response.
    pub index: u32,
    /// Generated message.
    pub message: Message,
    /// Reason the generation stopped (e.g., "stop", "length").
    pub finish_reason: String,
}

/// Token usage statistics for a generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Trait for LLM providers that can generate text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Client for LiteLLM-compatible APIs.
pub struct LiteLlmClient {
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    http_client: Client,
}

impl std::fmt::Debug for LiteLlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiteLlmClient")
            .field("api_base", &self.api_base)
            .field("has_api_key", &self.api_key.is_some())
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}

impl LiteLlmClient {
    /// Create a new client with explicit configuration.
    ///
    /// A client without an API key can be constructed, but every call to
    /// [`LlmProvider::generate`] fails with [`LlmError::MissingApiKey`].
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        default_model: impl Into<String>,
    ) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            default_model: default_model.into(),
            http_client,
        })
    }

    /// Create a new client from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `LITELLM_API_BASE`: Base URL for the API (defaults to OpenRouter)
    /// - `LITELLM_API_KEY` or `OPENROUTER_API_KEY`: API key
    /// - `LITELLM_DEFAULT_MODEL`: Default model
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base =
            env::var("LITELLM_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        let api_key = env::var("LITELLM_API_KEY")
            .or_else(|_| env::var("OPENROUTER_API_KEY"))
            .ok();
        let default_model =
            env::var("LITELLM_DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self::new(api_base, api_key, default_model)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Check if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Internal request structure for the OpenAI-compatible API.
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    response_format: ResponseFormat,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[async_trait]
impl LlmProvider for LiteLlmClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let api_key = self.api_key.as_ref().ok_or(LlmError::MissingApiKey)?;

        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model.clone()
        };

        let api_request = ApiRequest {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let url = format!("{}/chat/completions", self.api_base);

        let http_response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
            .header("X-Title", "examforge")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|r| r.error.message)
                .unwrap_or(error_text);

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }

            return Err(LlmError::ApiError {
                code: status_code,
                message,
            });
        }

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        let choices = api_response
            .choices
            .into_iter()
            .map(|choice| CompletionChoice {
                index: choice.index,
                message: Message {
                    role: choice.message.role,
                    content: choice.message.content.unwrap_or_default(),
                },
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            })
            .collect();

        let usage = api_response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(GenerationResponse {
            id: api_response.id,
            model: api_response.model,
            choices,
            usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are helpful.");
        assert_eq!(system.role, "system");
        assert_eq!(system.content, "You are helpful.");

        let user = Message::user("Hello");
        assert_eq!(user.role, "user");

        let assistant = Message::assistant("Hi there!");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn test_generation_request_builder_and_accessors() {
        let request = GenerationRequest::new(
            "gpt-4",
            vec![
                Message::system("sys"),
                Message::user("first"),
                Message::user("second"),
            ],
        )
        .with_temperature(0.7)
        .with_max_tokens(1000)
        .with_top_p(0.9);

        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(1000));
        assert_eq!(request.top_p, Some(0.9));
        assert_eq!(request.system_prompt(), Some("sys"));
        assert_eq!(request.user_prompt(), Some("second"));
    }

    #[test]
    fn test_response_from_text() {
        let response = GenerationResponse::from_text("mock", "{\"a\":1}");
        assert_eq!(response.first_content(), Some("{\"a\":1}"));
        assert_eq!(response.model, "mock");
    }

    #[test]
    fn test_client_new_trims_base_and_blank_key() {
        let client = LiteLlmClient::new("http://localhost:4000/", Some("   ".to_string()), "gpt-4")
            .expect("client builds");
        assert_eq!(client.api_base(), "http://localhost:4000");
        assert_eq!(client.default_model(), "gpt-4");
        assert!(!client.has_api_key());
    }

    #[tokio::test]
    async fn test_generate_without_key_fails_before_any_request() {
        let client = LiteLlmClient::new("http://localhost:65535", None, "gpt-4")
            .expect("client builds");
        let request = GenerationRequest::new("", vec![Message::user("test")]);
        let err = client.generate(request).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    #[tokio::test]
    async fn test_generate_connection_error() {
        let client = LiteLlmClient::new("http://localhost:65535", Some("key".to_string()), "gpt-4")
            .expect("client builds");
        let request = GenerationRequest::new("gpt-4", vec![Message::user("test")]);
        let err = client.generate(request).await.unwrap_err();
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }

    #[test]
    fn test_api_request_serialization() {
        let request = ApiRequest {
            model: "gpt-4".to_string(),
            messages: vec![Message::user("test")],
            temperature: Some(0.7),
            max_tokens: Some(1000),
            top_p: None,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let json = serde_json::to_string(&request).expect("serialization should succeed");
        assert!(json.contains("\"model\":\"gpt-4\""));
        assert!(json.contains("\"temperature\":0.7"));
        assert!(json.contains("\"type\":\"json_object\""));
        assert!(!json.contains("top_p"));
    }
}
