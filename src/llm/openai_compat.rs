use crate::config::{CHAT_TEMPERATURE, TEXT_MAX_OUTPUT_TOKENS, TEXT_TEMPERATURE};
use crate::llm::{LlmError, LlmProvider};
use async_openai::{
    config::OpenAIConfig,
    types::chat::{ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs},
    Client,
};
use async_trait::async_trait;

/// LLM provider for any OpenAI-compatible chat completions endpoint
pub struct OpenAiCompatProvider {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiCompatProvider {
    /// Create a provider pointed at `api_base`
    #[must_use]
    pub fn new(api_key: String, api_base: &str, model: String) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        Self {
            client: Client::with_config(config),
            model,
        }
    }

    async fn complete(
        &self,
        text: &str,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, LlmError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(text)
            .build()
            .map_err(|e| LlmError::Unknown(e.to_string()))?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(self.model.as_str())
            .messages(vec![message.into()])
            .temperature(temperature);
        if let Some(max_tokens) = max_tokens {
            args.max_completion_tokens(max_tokens);
        }
        let request = args.build().map_err(|e| LlmError::Unknown(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| LlmError::ApiError(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::ApiError("Empty response".to_string()))
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn generate_conversational(&self, text: &str) -> Result<String, LlmError> {
        self.complete(text, CHAT_TEMPERATURE, None).await
    }

    async fn generate_from_instruction(&self, text: &str) -> Result<String, LlmError> {
        self.complete(text, TEXT_TEMPERATURE, Some(TEXT_MAX_OUTPUT_TOKENS))
            .await
    }
}
