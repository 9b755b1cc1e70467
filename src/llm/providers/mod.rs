//! Preset providers built on the OpenAI-compatible client.

pub mod openrouter;

pub use openrouter::OpenRouterProvider;
