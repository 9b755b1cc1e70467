//! OpenRouter provider.
//!
//! OpenRouter exposes many vendors' models behind one OpenAI-compatible
//! endpoint, so the provider is a preset of [`LiteLlmClient`] with its own
//! registry name and key handling.

use async_trait::async_trait;
use std::env;

use crate::error::LlmError;
use crate::llm::{Invocation, InvocationRequest, LiteLlmClient, ModelInfo, ModelProvider};

/// Default OpenRouter API endpoint.
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

const PROVIDER_NAME: &str = "openrouter";

/// OpenRouter provider for trial invocations and model listing.
pub struct OpenRouterProvider {
    inner: LiteLlmClient,
    api_key: String,
}

impl OpenRouterProvider {
    /// Creates a provider against the public OpenRouter endpoint.
    pub fn new(api_key: String) -> Result<Self, LlmError> {
        Self::with_custom_url(api_key, OPENROUTER_BASE_URL.to_string())
    }

    /// Creates a provider against an OpenRouter-compatible proxy.
    pub fn with_custom_url(api_key: String, base_url: String) -> Result<Self, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey(PROVIDER_NAME.to_string()));
        }
        let inner = LiteLlmClient::new(base_url, Some(api_key.clone()))?.with_name(PROVIDER_NAME);
        Ok(Self { inner, api_key })
    }

    /// Reads the key from `OPENROUTER_API_KEY`.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env::var("OPENROUTER_API_KEY")
            .map_err(|_| LlmError::MissingApiKey(PROVIDER_NAME.to_string()))?;
        Self::new(api_key)
    }

    /// The API key with everything but its ends masked, for logs.
    pub fn api_key_masked(&self) -> String {
        if self.api_key.len() <= 8 {
            "*".repeat(self.api_key.len())
        } else {
            format!(
                "{}...{}",
                &self.api_key[..4],
                &self.api_key[self.api_key.len() - 4..]
            )
        }
    }

    pub fn base_url(&self) -> &str {
        self.inner.api_base()
    }
}

#[async_trait]
impl ModelProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn invoke(&self, request: InvocationRequest) -> Result<Invocation, LlmError> {
        tracing::debug!(
            provider = PROVIDER_NAME,
            model = %request.model,
            key = %self.api_key_masked(),
            "Invoking OpenRouter model"
        );
        self.inner.invoke(request).await
    }

    async fn fetch_models(&self) -> Result<Vec<ModelInfo>, LlmError> {
        self.inner.fetch_models().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::job::ConfigId;

    #[test]
    fn test_openrouter_provider_new() {
        let provider = OpenRouterProvider::new("sk-or-test-key-1234".to_string()).expect("provider");
        assert_eq!(provider.name(), "openrouter");
        assert_eq!(provider.base_url(), OPENROUTER_BASE_URL);
    }

    #[test]
    fn test_empty_key_rejected() {
        let err = OpenRouterProvider::new("  ".to_string()).err().expect("rejected");
        assert!(matches!(err, LlmError::MissingApiKey(ref p) if p == "openrouter"));
    }

    #[test]
    fn test_api_key_masked() {
        let short = OpenRouterProvider::new("short".to_string()).expect("provider");
        assert_eq!(short.api_key_masked(), "*****");

        let normal = OpenRouterProvider::new("sk-or-abcdefgh1234".to_string()).expect("provider");
        assert_eq!(normal.api_key_masked(), "sk-o...1234");
    }

    #[tokio::test]
    async fn test_invoke_connection_error() {
        let provider = OpenRouterProvider::with_custom_url(
            "test-key".to_string(),
            "http://localhost:65535".to_string(),
        )
        .expect("provider");

        let request = InvocationRequest::new("test-model", "test", ConfigId::full());
        let err = provider.invoke(request).await.expect_err("no server");
        assert!(matches!(err, LlmError::RequestFailed(_)));
    }
}
