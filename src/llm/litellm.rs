//! OpenAI-compatible chat-completions client.
//!
//! Works against LiteLLM proxies and any endpoint exposing
//! `POST {base}/chat/completions` and `GET {base}/models`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use super::{Invocation, InvocationRequest, ModelInfo, ModelProvider};
use crate::error::LlmError;

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 120;

const PROVIDER_NAME: &str = "litellm";

/// A message in a conversation with a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the sender ("system", "user" or "assistant").
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Builds the shared HTTP client.
pub(crate) fn build_http_client(timeout: Duration) -> Result<Client, LlmError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))
}

/// Client for OpenAI-compatible APIs.
pub struct LiteLlmClient {
    name: String,
    api_base: String,
    api_key: Option<String>,
    http_client: Client,
}

impl LiteLlmClient {
    /// Creates a client for `api_base` (e.g. "http://localhost:4000").
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Result<Self, LlmError> {
        Ok(Self {
            name: PROVIDER_NAME.to_string(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            http_client: build_http_client(Duration::from_secs(REQUEST_TIMEOUT_SECS))?,
        })
    }

    /// Creates a client from environment variables.
    ///
    /// - `LITELLM_API_BASE`: base URL (required)
    /// - `LITELLM_API_KEY`: bearer token (optional)
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("LITELLM_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("LITELLM_API_KEY").ok();
        Self::new(api_base, api_key)
    }

    /// Registers the client under a different provider name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, LlmError> {
        self.http_client = build_http_client(timeout)?;
        Ok(self)
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let request = request
            .header("HTTP-Referer", "https://maac-forge.local")
            .header("X-Title", "maac-forge");
        match self.api_key {
            Some(ref api_key) => request.header("Authorization", format!("Bearer {}", api_key)),
            None => request,
        }
    }
}

/// Internal request structure for the chat-completions API.
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

impl ApiRequest {
    fn from_invocation(request: InvocationRequest) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = request.system_prompt {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(request.prompt));
        Self {
            model: request.model,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
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

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

/// Maps a non-success status and body to an error.
pub(crate) fn api_error(status_code: u16, body: String) -> LlmError {
    let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body,
    };
    if status_code == 429 {
        LlmError::RateLimited(message)
    } else {
        LlmError::ApiError {
            code: status_code,
            message,
        }
    }
}

/// Converts a chat-completions body into an invocation.
fn parse_invocation(body: &str, config_id: &str) -> Result<Invocation, LlmError> {
    let response: ApiResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::ParseError("Response contained no choices".to_string()))?;

    Ok(Invocation {
        content: choice.message.content.unwrap_or_default(),
        metadata: serde_json::json!({
            "id": response.id,
            "model": response.model,
            "finish_reason": choice.finish_reason,
            "usage": response.usage,
            "config_id": config_id,
        }),
    })
}

/// Parses a `GET /models` body.
pub(crate) fn parse_models(body: &str) -> Result<Vec<ModelInfo>, LlmError> {
    let response: ModelsResponse = serde_json::from_str(body)
        .map_err(|e| LlmError::ParseError(format!("Failed to parse model list: {}", e)))?;
    Ok(response.data)
}

#[async_trait]
impl ModelProvider for LiteLlmClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<Invocation, LlmError> {
        let config_id = request.config_id.to_string();
        let api_request = ApiRequest::from_invocation(request);
        let url = format!("{}/chat/completions", self.api_base);

        let http_response = self
            .authorize(self.http_client.post(&url))
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout {
                        seconds: REQUEST_TIMEOUT_SECS,
                    }
                } else {
                    LlmError::RequestFailed(e.to_string())
                }
            })?;

        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), body));
        }
        parse_invocation(&body, &config_id)
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        let url = format!("{}/models", self.api_base);
        let http_response = self
            .authorize(self.http_client.get(&url))
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();
        let body = http_response
            .text()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(api_error(status.as_u16(), body));
        }
        parse_models(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::ConfigId;

    #[test]
    fn test_client_new_trims_base() {
        let client = LiteLlmClient::new("http://localhost:4000/", Some("key".to_string()))
            .expect("client");
        assert_eq!(client.api_base(), "http://localhost:4000");
        assert!(client.has_api_key());
        assert_eq!(client.name(), "litellm");

        let renamed = client.with_name("local");
        assert_eq!(renamed.name(), "local");
    }

    #[test]
    fn test_api_request_from_invocation() {
        let request = InvocationRequest::new("m1", "Solve it", ConfigId::baseline())
            .with_system_prompt("Be precise")
            .with_temperature(0.2);
        let api_request = ApiRequest::from_invocation(request);
        assert_eq!(api_request.messages.len(), 2);
        assert_eq!(api_request.messages[0], Message::system("Be precise"));

        let json = serde_json::to_string(&api_request).expect("serialize");
        assert!(json.contains("\"model\":\"m1\""));
        assert!(json.contains("\"temperature\":0.2"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn test_parse_invocation() {
        let body = r#"{
            "id": "cmpl-1",
            "model": "m1",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "42"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12}
        }"#;
        let invocation = parse_invocation(body, "111111111111").expect("parse");
        assert_eq!(invocation.content, "42");
        assert_eq!(invocation.metadata["finish_reason"], "stop");
        assert_eq!(invocation.metadata["usage"]["total_tokens"], 12);
        assert_eq!(invocation.metadata["config_id"], "111111111111");

        let empty = parse_invocation(r#"{"choices": []}"#, "000000000000");
        assert!(matches!(empty, Err(LlmError::ParseError(_))));
    }

    #[test]
    fn test_api_error_mapping() {
        let err = api_error(429, r#"{"error": {"message": "slow down"}}"#.to_string());
        assert!(matches!(err, LlmError::RateLimited(ref m) if m == "slow down"));
        assert!(err.is_retryable());

        let err = api_error(400, "plain text".to_string());
        assert!(matches!(err, LlmError::ApiError { code: 400, ref message } if message == "plain text"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_parse_models() {
        let body = r#"{"data": [{"id": "m1"}, {"id": "m2", "name": "Model Two", "context_length": 8192}]}"#;
        let models = parse_models(body).expect("parse");
        assert_eq!(models.len(), 2);
        assert_eq!(models[0], ModelInfo::new("m1"));
        assert_eq!(models[1].context_length, Some(8192));
    }

    #[tokio::test]
    async fn test_invoke_connection_error() {
        let client = LiteLlmClient::new("http://localhost:65535", None).expect("client");
        let request = InvocationRequest::new("m1", "test", ConfigId::full());
        let err = client.invoke(request).await.expect_err("no server");
        assert!(matches!(err, LlmError::RequestFailed(_)));
        assert!(err.is_retryable());
    }
}
