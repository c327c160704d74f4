//! LLM integration.
//!
//! The pipeline talks to the model through the [`LlmProvider`] trait so the
//! extractor can be exercised with canned responses. [`OpenAiCompatProvider`]
//! is the production backend for any OpenAI-compatible chat completions API.

pub mod openai;
pub mod provider;

pub use openai::OpenAiCompatProvider;
pub use provider::*;

use std::sync::Arc;

use crate::config::LlmConfig;

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Arc<dyn LlmProvider> {
    tracing::info!("Using OpenAI-compatible API (model: {})", config.model);
    Arc::new(OpenAiCompatProvider::new(
        config.api_key.clone(),
        config.base_url.clone(),
        config.model.clone(),
    ))
}
