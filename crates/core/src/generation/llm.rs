//! Completion clients for the LLM providers the generation backend can use.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

/// Error type for LLM operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Not configured")]
    NotConfigured,
}

impl LlmError {
    /// Transport failures, timeouts, rate limiting and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(_) | LlmError::Timeout(_) => true,
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::Json(_) | LlmError::NotConfigured => false,
        }
    }

    fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            LlmError::Timeout(timeout)
        } else {
            LlmError::Http(err.to_string())
        }
    }
}

/// Token usage statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Request for a completion.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 4096,
            temperature: 0.2,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// Response from a completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: LlmUsage,
    pub model: String,
}

/// Slice out the outermost JSON object of a model reply.
///
/// Models like to wrap JSON in prose or code fences; everything before the
/// first `{` and after the last `}` is dropped.
pub fn extract_json_object(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end >= start => &text[start..=end],
        _ => text,
    }
}

/// Trait for LLM clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name (e.g., "anthropic", "ollama")
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    /// Send a completion request and get a text response.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Send a completion request and parse the JSON object in the reply.
    async fn complete_json<T: DeserializeOwned>(
        &self,
        request: CompletionRequest,
    ) -> Result<(T, LlmUsage), LlmError> {
        let response = self.complete(request).await?;
        let json = extract_json_object(&response.text);
        let parsed: T = serde_json::from_str(json)
            .map_err(|e| LlmError::Json(format!("{}: {}", e, truncate(&response.text, 200))))?;
        Ok((parsed, response.usage))
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn build_http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Send a prepared request and decode a 200 reply as `R`.
///
/// Non-200 replies become [`LlmError::Api`]; `error_message` pulls the
/// provider's message out of the error body when it has the expected shape.
async fn send_json<R: DeserializeOwned>(
    request: reqwest::RequestBuilder,
    timeout: Duration,
    error_message: fn(&str) -> Option<String>,
) -> Result<R, LlmError> {
    let response = request
        .send()
        .await
        .map_err(|e| LlmError::from_reqwest(e, timeout))?;

    let status = response.status().as_u16();
    if status != 200 {
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or(body);
        return Err(LlmError::Api { status, message });
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::Json(e.to_string()))
}

/// Default request timeout; synthesis over many chunks can be slow.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

// ============================================================================
// Anthropic
// ============================================================================

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OLLAMA_API_BASE: &str = "http://localhost:11434";

/// Anthropic Messages API client.
pub struct AnthropicClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: build_http_client(DEFAULT_TIMEOUT),
            api_key: api_key.into(),
            model: model.into(),
            api_base: ANTHROPIC_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_http_client(timeout);
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
    model: String,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorDetail,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorDetail {
    message: String,
}

#[async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            system: request.system,
            messages: vec![AnthropicMessage {
                role: "user",
                content: request.prompt,
            }],
            temperature: request.temperature,
        };

        let request = self
            .client
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body);
        let parsed: AnthropicResponse = send_json(request, self.timeout, |body| {
            serde_json::from_str::<AnthropicError>(body)
                .ok()
                .map(|e| e.error.message)
        })
        .await?;

        let text = parsed
            .content
            .into_iter()
            .filter(|c| c.content_type == "text")
            .map(|c| c.text)
            .collect::<String>();

        Ok(CompletionResponse {
            text,
            usage: LlmUsage {
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            },
            model: parsed.model,
        })
    }
}

// ============================================================================
// Ollama
// ============================================================================

/// Client for an Ollama server, local by default.
pub struct OllamaClient {
    client: reqwest::Client,
    model: String,
    api_base: String,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            client: build_http_client(DEFAULT_TIMEOUT),
            model: model.into(),
            api_base: OLLAMA_API_BASE.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_http_client(timeout);
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
    format: &'static str,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    model: String,
    response: String,
    #[serde(default)]
    eval_count: u32,
    #[serde(default)]
    prompt_eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaErrorResponse {
    error: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    fn provider(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = OllamaRequest {
            model: self.model.clone(),
            prompt: request.prompt,
            system: request.system,
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
            },
        };

        let request = self
            .client
            .post(format!("{}/api/generate", self.api_base))
            .json(&body);
        let parsed: OllamaResponse = send_json(request, self.timeout, |body| {
            serde_json::from_str::<OllamaErrorResponse>(body)
                .ok()
                .map(|e| e.error)
        })
        .await?;

        Ok(CompletionResponse {
            text: parsed.response,
            usage: LlmUsage {
                input_tokens: parsed.prompt_eval_count,
                output_tokens: parsed.eval_count,
            },
            model: parsed.model,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new("Extract")
            .with_system("You write study notes")
            .with_max_tokens(2000)
            .with_temperature(0.0);

        assert_eq!(request.prompt, "Extract");
        assert_eq!(request.system.as_deref(), Some("You write study notes"));
        assert_eq!(request.max_tokens, 2000);
        assert_eq!(request.temperature, 0.0);
    }

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Http("connection reset".into()).is_transient());
        assert!(LlmError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(LlmError::Api {
            status: 429,
            message: "slow down".into()
        }
        .is_transient());
        assert!(LlmError::Api {
            status: 503,
            message: "overloaded".into()
        }
        .is_transient());
        assert!(!LlmError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_transient());
        assert!(!LlmError::Json("eof".into()).is_transient());
        assert!(!LlmError::NotConfigured.is_transient());
    }

    #[test]
    fn test_extract_json_object() {
        assert_eq!(
            extract_json_object("Here you go:\n```json\n{\"a\": {\"b\": 1}}\n```"),
            "{\"a\": {\"b\": 1}}"
        );
        assert_eq!(extract_json_object("no json"), "no json");
        assert_eq!(extract_json_object("} backwards {"), "} backwards {");
    }

    #[test]
    fn test_ollama_client_configuration() {
        let client = OllamaClient::new("llama3")
            .with_api_base("http://gpu-box:11434")
            .with_timeout(Duration::from_secs(30));
        assert_eq!(client.provider(), "ollama");
        assert_eq!(client.model(), "llama3");
        assert_eq!(client.api_base, "http://gpu-box:11434");
        assert_eq!(client.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_ollama_request_asks_for_json() {
        let request = OllamaRequest {
            model: "llama3".to_string(),
            prompt: "Hello".to_string(),
            system: None,
            stream: false,
            format: "json",
            options: OllamaOptions {
                temperature: 0.2,
                num_predict: 512,
            },
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"format\":\"json\""));
        assert!(json.contains("\"stream\":false"));
        assert!(!json.contains("\"system\""));
    }

    #[test]
    fn test_anthropic_client_defaults() {
        let client = AnthropicClient::new("sk-test", "claude-sonnet");
        assert_eq!(client.provider(), "anthropic");
        assert_eq!(client.api_base, "https://api.anthropic.com");
        assert_eq!(client.timeout, DEFAULT_TIMEOUT);
    }
}
