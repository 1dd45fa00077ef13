use crate::llm::http_utils::{create_http_client, describe_http_error};
use crate::providers::ProviderError;
use crate::utils::retry_once;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde_json::Value;
use tracing::warn;

const TRANSLATE_URL: &str = "https://clients5.google.com/translate_a/t";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/118.0.0.0 Safari/537.36";

/// Language tag for English
pub const ENGLISH: &str = "en";

/// Text together with the language it is written in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    /// The (translated) text
    pub text: String,
    /// Detected or target language tag
    pub lang: String,
}

impl Translation {
    /// Text already in English
    #[must_use]
    pub fn english(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            lang: ENGLISH.to_string(),
        }
    }
}

/// Translation collaborator. Neither method fails: on error the input comes back.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates to English, reporting the detected source language
    async fn to_english(&self, text: &str) -> Translation;

    /// Translates English text into `lang`; identity for English
    async fn from_english(&self, text: &str, lang: &str) -> String;
}

/// Client for the public Google translate endpoint
pub struct GoogleTranslator {
    http_client: HttpClient,
}

impl GoogleTranslator {
    /// Create a translator whose requests time out after `timeout_secs`
    #[must_use]
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            http_client: create_http_client(timeout_secs),
        }
    }

    async fn request(&self, text: &str, source: &str, target: &str) -> Result<Value, ProviderError> {
        let response = self
            .http_client
            .get(TRANSLATE_URL)
            .header("User-Agent", BROWSER_USER_AGENT)
            .query(&[
                ("client", "dict-chrome-ex"),
                ("sl", source),
                ("tl", target),
                ("q", text),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(describe_http_error(status, &body)));
        }
        Ok(response.json().await?)
    }
}

/// Parses `[["text", "lang"]]` (auto-detect) or `["text"]` (fixed source)
fn parse_detected(value: &Value) -> Option<Translation> {
    let first = value.get(0)?;
    match first {
        Value::Array(pair) => Some(Translation {
            text: pair.first()?.as_str()?.to_string(),
            lang: pair.get(1)?.as_str()?.to_string(),
        }),
        Value::String(text) => Some(Translation::english(text.clone())),
        _ => None,
    }
}

fn parse_translated(value: &Value) -> Option<String> {
    let first = value.get(0)?;
    match first {
        Value::String(text) => Some(text.clone()),
        Value::Array(pair) => pair.first()?.as_str().map(ToString::to_string),
        _ => None,
    }
}

#[async_trait]
impl Translator for GoogleTranslator {
    async fn to_english(&self, text: &str) -> Translation {
        let result = retry_once("Translation to English", || self.request(text, "auto", ENGLISH))
            .await;
        match result.map(|v| parse_detected(&v)) {
            Ok(Some(translation)) => translation,
            Ok(None) => {
                warn!("Unexpected translation payload, keeping original text");
                Translation::english(text)
            }
            Err(e) => {
                warn!("Translation to English failed, keeping original text: {e}");
                Translation::english(text)
            }
        }
    }

    async fn from_english(&self, text: &str, lang: &str) -> String {
        if lang == ENGLISH {
            return text.to_string();
        }
        let result =
            retry_once("Translation from English", || self.request(text, ENGLISH, lang)).await;
        match result.map(|v| parse_translated(&v)) {
            Ok(Some(translated)) => translated,
            Ok(None) => {
                warn!("Unexpected translation payload, keeping English text");
                text.to_string()
            }
            Err(e) => {
                warn!("Translation to {lang} failed, keeping English text: {e}");
                text.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_detected_pair() {
        let value = json!([["hello", "es"]]);
        assert_eq!(
            parse_detected(&value),
            Some(Translation {
                text: "hello".into(),
                lang: "es".into()
            })
        );
    }

    #[test]
    fn test_parse_detected_rejects_garbage() {
        assert_eq!(parse_detected(&json!({"error": 1})), None);
        assert_eq!(parse_detected(&json!([42])), None);
    }

    #[test]
    fn test_parse_translated_plain_list() {
        assert_eq!(parse_translated(&json!(["hola"])), Some("hola".into()));
        assert_eq!(parse_translated(&json!([["hola", "en"]])), Some("hola".into()));
    }

    #[tokio::test]
    async fn test_from_english_is_identity_for_english() {
        let translator = GoogleTranslator::new(1);
        assert_eq!(translator.from_english("hi there", "en").await, "hi there");
    }
}
