//! Provider lookup and cached model catalogs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::cache::{Clock, ModelListCache};
use super::{ModelInfo, ModelProvider};
use crate::error::LlmError;

/// Providers keyed by their [`ModelProvider::name`].
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ModelProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a provider, replacing any previous one with the same name.
    pub fn register(&mut self, provider: Arc<dyn ModelProvider>) {
        let name = provider.name().to_string();
        debug!(provider = %name, "Registered model provider");
        self.providers.insert(name, provider);
    }

    pub fn with_provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn ModelProvider>, LlmError> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| LlmError::UnknownProvider(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

/// Model lists per provider, fetched on demand and cached for a TTL.
pub struct ModelCatalog {
    registry: Arc<ProviderRegistry>,
    cache: ModelListCache,
}

impl ModelCatalog {
    pub fn new(registry: Arc<ProviderRegistry>, ttl: Duration) -> Self {
        Self {
            registry,
            cache: ModelListCache::new(ttl),
        }
    }

    pub fn with_clock(registry: Arc<ProviderRegistry>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry,
            cache: ModelListCache::with_clock(ttl, clock),
        }
    }

    pub fn cache(&self) -> &ModelListCache {
        &self.cache
    }

    /// Models served by `provider`, from cache when fresh.
    pub async fn models(&self, provider: &str) -> Result<Vec<ModelInfo>, LlmError> {
        if let Some(models) = self.cache.get(provider) {
            return Ok(models);
        }

        let models = self.registry.get(provider)?.fetch_models().await?;
        info!(provider = %provider, count = models.len(), "Fetched model list");
        self.cache.insert(provider, models.clone());
        Ok(models)
    }

    /// Fails with [`LlmError::InvalidModel`] unless `provider` lists `model`.
    pub async fn ensure_model(&self, provider: &str, model: &str) -> Result<(), LlmError> {
        let models = self.models(provider).await?;
        if models.iter().any(|m| m.id == model) {
            Ok(())
        } else {
            Err(LlmError::InvalidModel(format!("{} (provider {})", model, provider)))
        }
    }
}
