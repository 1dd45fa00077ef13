use crate::config::{CHAT_TEMPERATURE, TEXT_MAX_OUTPUT_TOKENS, TEXT_TEMPERATURE};
use crate::llm::http_utils::{create_http_client, extract_text_content, send_json_request};
use crate::llm::{LlmError, LlmProvider};
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// LLM provider implementation for Google Gemini
pub struct GeminiProvider {
    http_client: HttpClient,
    api_key: String,
    chat_model: String,
    text_model: String,
}

impl GeminiProvider {
    /// Create a new Gemini provider instance
    #[must_use]
    pub fn new(api_key: String, chat_model: String, text_model: String, timeout_secs: u64) -> Self {
        Self {
            http_client: create_http_client(timeout_secs),
            api_key,
            chat_model,
            text_model,
        }
    }

    async fn generate(&self, model_id: &str, body: &Value) -> Result<String, LlmError> {
        let url = format!(
            "{GEMINI_API_BASE}/{model_id}:generateContent?key={}",
            self.api_key
        );
        let res_json = send_json_request(&self.http_client, &url, body, None, &[]).await?;
        extract_text_content(
            &res_json,
            &["candidates", "0", "content", "parts", "0", "text"],
        )
    }
}

fn chat_body(text: &str) -> Value {
    json!({
        "contents": [{
            "role": "user",
            "parts": [{"text": text}]
        }],
        "generationConfig": {
            "temperature": CHAT_TEMPERATURE,
            "candidateCount": 1,
            "topK": 35,
            "topP": 0.75
        }
    })
}

fn instruction_body(text: &str) -> Value {
    json!({
        "contents": [{
            "parts": [{"text": text}]
        }],
        "generationConfig": {
            "temperature": TEXT_TEMPERATURE,
            "candidateCount": 1,
            "topK": 40,
            "topP": 0.55,
            "maxOutputTokens": TEXT_MAX_OUTPUT_TOKENS
        }
    })
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    async fn generate_conversational(&self, text: &str) -> Result<String, LlmError> {
        self.generate(&self.chat_model, &chat_body(text)).await
    }

    async fn generate_from_instruction(&self, text: &str) -> Result<String, LlmError> {
        self.generate(&self.text_model, &instruction_body(text)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instruction_body_caps_output() {
        let body = instruction_body("summarize: hi");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "summarize: hi");
        assert_eq!(
            body["generationConfig"]["maxOutputTokens"],
            TEXT_MAX_OUTPUT_TOKENS
        );
    }

    #[test]
    fn test_chat_body_is_single_user_turn() {
        let body = chat_body("hello");
        assert_eq!(body["contents"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["contents"][0]["role"], "user");
    }
}
