//! Model invocation capability.
//!
//! The engine never parses provider-specific payloads itself. It talks to a
//! [`ModelProvider`], which turns a rendered prompt into `{content, metadata}`
//! and lists the models it serves. Providers are looked up by name through a
//! [`ProviderRegistry`], so a new provider is a new trait impl rather than a
//! new match arm.
//!
//! ```ignore
//! use maac_forge::llm::{LiteLlmClient, ModelCatalog, ProviderRegistry};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let mut registry = ProviderRegistry::new();
//! registry.register(Arc::new(LiteLlmClient::from_env()?));
//! let catalog = ModelCatalog::new(Arc::new(registry), Duration::from_secs(300));
//! let models = catalog.models("litellm").await?;
//! ```

pub mod cache;
pub mod litellm;
pub mod prompt;
pub mod providers;
pub mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::scheduler::job::ConfigId;

pub use cache::{Clock, ManualClock, ModelListCache, SystemClock};
pub use litellm::{LiteLlmClient, Message};
pub use prompt::{render_trial_prompt, TRIAL_SYSTEM_PROMPT};
pub use providers::OpenRouterProvider;
pub use registry::{ModelCatalog, ProviderRegistry};

/// One call to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub model: String,
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Capabilities enabled for the trial, forwarded as metadata.
    pub config_id: ConfigId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl InvocationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, config_id: ConfigId) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            system_prompt: None,
            config_id,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// A model's answer plus whatever the provider reports about the call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub content: String,
    pub metadata: serde_json::Value,
}

/// A model listed by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_length: Option<u64>,
}

impl ModelInfo {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            context_length: None,
        }
    }
}

/// A named source of model invocations.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Registry key, e.g. `openrouter`.
    fn name(&self) -> &str;

    /// Sends one prompt and returns the model's answer.
    async fn invoke(&self, request: InvocationRequest) -> Result<Invocation, LlmError>;

    /// Lists the models this provider can serve.
    async fn fetch_models(&self) -> Result<Vec<ModelInfo>, LlmError>;
}
