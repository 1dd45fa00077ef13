//! Generative text backends
//!
//! Two calls are needed by the bot: a conversational reply to free text and
//! an instruction-style completion used by the rewrite actions. Both are
//! served by an [`LlmProvider`]; the process holds it behind a
//! [`ModelHandle`] so `/reset` can swap in a freshly built client.

/// Google Gemini client
pub mod gemini;
/// HTTP helpers shared by collaborator clients
pub mod http_utils;
/// OpenAI-compatible chat completions client
pub mod openai_compat;

use crate::config::Settings;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

/// Errors returned by generative backends
#[derive(Debug, Error)]
pub enum LlmError {
    /// Upstream rejected the request
    #[error("API error: {0}")]
    ApiError(String),
    /// Transport failure or timeout
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Response could not be decoded
    #[error("JSON error: {0}")]
    JsonError(String),
    /// No backend credentials were configured
    #[error("Missing client/API key: {0}")]
    MissingConfig(String),
    /// Anything else
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Interface for generative text backends
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Replies to a chat message
    async fn generate_conversational(&self, text: &str) -> Result<String, LlmError>;

    /// Completes an instruction prompt
    async fn generate_from_instruction(&self, text: &str) -> Result<String, LlmError>;
}

type ProviderFactory = Box<dyn Fn() -> Result<Arc<dyn LlmProvider>, LlmError> + Send + Sync>;

/// Process-wide holder of the active backend client
pub struct ModelHandle {
    factory: ProviderFactory,
    current: RwLock<Arc<dyn LlmProvider>>,
}

impl ModelHandle {
    /// Builds the first client with `factory` and keeps the factory for resets.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if the first client cannot be built.
    pub fn new<F>(factory: F) -> Result<Self, LlmError>
    where
        F: Fn() -> Result<Arc<dyn LlmProvider>, LlmError> + Send + Sync + 'static,
    {
        let current = factory()?;
        Ok(Self {
            factory: Box::new(factory),
            current: RwLock::new(current),
        })
    }

    /// Handle built from the configured backend
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingConfig` when no backend key is configured.
    pub fn from_settings(settings: &Settings) -> Result<Self, LlmError> {
        let settings = settings.clone();
        Self::new(move || build_provider(&settings))
    }

    /// Discards the current client and builds a new one
    ///
    /// # Errors
    ///
    /// Returns the factory's error; the previous client stays active in that case.
    pub async fn reset(&self) -> Result<(), LlmError> {
        let fresh = (self.factory)()?;
        *self.current.write().await = fresh;
        info!("Language model client rebuilt");
        Ok(())
    }

    async fn provider(&self) -> Arc<dyn LlmProvider> {
        self.current.read().await.clone()
    }
}

#[async_trait]
impl LlmProvider for ModelHandle {
    async fn generate_conversational(&self, text: &str) -> Result<String, LlmError> {
        self.provider().await.generate_conversational(text).await
    }

    async fn generate_from_instruction(&self, text: &str) -> Result<String, LlmError> {
        self.provider().await.generate_from_instruction(text).await
    }
}

/// Picks Gemini when its key is present, else the OpenAI-compatible endpoint
///
/// # Errors
///
/// Returns `LlmError::MissingConfig` when neither key is set.
pub fn build_provider(settings: &Settings) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if let Some(key) = settings.gemini_api_key.as_ref() {
        return Ok(Arc::new(gemini::GeminiProvider::new(
            key.clone(),
            settings.gemini_chat_model.clone(),
            settings.gemini_text_model.clone(),
            settings.http_timeout_secs,
        )));
    }
    if let Some(key) = settings.openai_api_key.as_ref() {
        return Ok(Arc::new(openai_compat::OpenAiCompatProvider::new(
            key.clone(),
            &settings.openai_api_base,
            settings.openai_model.clone(),
        )));
    }
    Err(LlmError::MissingConfig(
        "GEMINI_API_KEY or OPENAI_API_KEY".to_string(),
    ))
}
