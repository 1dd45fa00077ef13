//! Non-LLM collaborators: translation, speech synthesis and image generation.
//!
//! Each one is a narrow trait with a single HTTP-backed implementation.

/// Stability AI text-to-image client
pub mod image;
/// Google translate TTS client
pub mod speech;
/// Google translate client
pub mod translate;

use crate::artifact::ArtifactError;
use crate::llm::LlmError;
use thiserror::Error;

pub use image::{ImageGenerator, StabilityImageGenerator};
pub use speech::{GoogleSpeech, SpeechSynthesizer};
pub use translate::{GoogleTranslator, Translation, Translator};

/// Errors raised by collaborator clients
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure or timeout
    #[error("network error: {0}")]
    Network(String),
    /// Upstream answered with an error status
    #[error("API error: {0}")]
    Api(String),
    /// Upstream answered with something we could not decode
    #[error("decode error: {0}")]
    Decode(String),
    /// Required credentials are absent
    #[error("missing configuration: {0}")]
    MissingConfig(String),
    /// The produced file could not be written
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl From<LlmError> for ProviderError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::NetworkError(e) => Self::Network(e),
            LlmError::JsonError(e) => Self::Decode(e),
            LlmError::MissingConfig(e) => Self::MissingConfig(e),
            LlmError::ApiError(e) | LlmError::Unknown(e) => Self::Api(e),
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}
