use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::errors::ApiError;

/// Classified failure of a completion provider call. Each member is distinct
/// so the caller can choose user-facing messaging without string matching.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("provider request timed out")]
    Timeout,

    #[error("provider rate limited the request")]
    RateLimited,

    #[error("provider rejected credentials")]
    AuthFailed,

    #[error("provider returned {status}: {detail}")]
    Api { status: u16, detail: String },

    #[error("network failure: {0}")]
    Network(String),

    #[error("provider returned an empty response")]
    EmptyResponse,
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Timeout => ApiError::ProviderTimeout,
            ProviderError::RateLimited => ApiError::ProviderRateLimited,
            ProviderError::AuthFailed => ApiError::ProviderAuthFailed,
            other => ApiError::ProviderError(other.to_string()),
        }
    }
}

fn classify_transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(err.to_string())
    }
}

fn classify_status(status: StatusCode, detail: String) -> ProviderError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::AuthFailed,
        _ => ProviderError::Api {
            status: status.as_u16(),
            detail,
        },
    }
}

/// A completion provider behind a uniform contract. One attempt per call; no
/// retry at this layer.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, system_message: &str, prompt: &str) -> Result<String, ProviderError>;

    fn provider_name(&self) -> &'static str;

    fn model_name(&self) -> &str;
}

/// Which completion provider the service is configured to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationProviderKind {
    OpenAi,
    Gemini,
}

/// Create the configured completion backend.
pub fn create_completion_backend(
    kind: GenerationProviderKind,
    api_key: String,
    base_url: Option<String>,
    model: Option<String>,
    timeout: Duration,
) -> Box<dyn CompletionBackend> {
    match kind {
        GenerationProviderKind::OpenAi => {
            Box::new(OpenAiBackend::new(api_key, base_url, model, timeout))
        }
        GenerationProviderKind::Gemini => {
            Box::new(GeminiBackend::new(api_key, base_url, model, timeout))
        }
    }
}

/// Common message structure for chat-completion requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// OpenAI-compatible chat completions backend.
pub struct OpenAiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

impl OpenAiBackend {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            model: model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiBackend {
    async fn complete(&self, system_message: &str, prompt: &str) -> Result<String, ProviderError> {
        let request_body = OpenAiRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_message.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            temperature: 0.7,
        };

        info!(
            provider = self.provider_name(),
            model = %self.model,
            prompt_length = prompt.len(),
            "Making completion request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = self.provider_name(),
                status = %status,
                error = %error_text,
                "Completion request failed"
            );
            return Err(classify_status(status, error_text));
        }

        let parsed: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(ProviderError::EmptyResponse)?;

        info!(
            provider = self.provider_name(),
            response_length = content.len(),
            "Completion response received"
        );

        Ok(content)
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Gemini generateContent backend.
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiGenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: i32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

impl GeminiBackend {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            model: model.unwrap_or_else(|| "gemini-2.0-flash-exp".to_string()),
        }
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    async fn complete(&self, system_message: &str, prompt: &str) -> Result<String, ProviderError> {
        let full_prompt = format!("{}\n\n{}", system_message, prompt);

        let request_body = GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: full_prompt }],
            }],
            generation_config: GeminiGenerationConfig {
                temperature: 0.7,
                max_output_tokens: 2048,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        info!(
            provider = self.provider_name(),
            model = %self.model,
            prompt_length = prompt.len(),
            "Making completion request"
        );

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            error!(
                provider = self.provider_name(),
                status = %status,
                error = %error_text,
                "Completion request failed"
            );
            return Err(classify_status(status, error_text));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let content = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or(ProviderError::EmptyResponse)?;

        info!(
            provider = self.provider_name(),
            response_length = content.len(),
            "Completion response received"
        );

        Ok(content)
    }

    fn provider_name(&self) -> &'static str {
        "Gemini"
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
