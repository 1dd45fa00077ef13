//! HTTP utilities for collaborator clients
//!
//! Request/response handling shared by the Gemini client and the other
//! HTTP-backed providers (translation, speech, image generation).

use crate::llm::LlmError;
use reqwest::Client as HttpClient;
use serde_json::Value;
use std::time::Duration;

/// Creates an HTTP client with a bounded request timeout.
///
/// A hung upstream can never block a handler for longer than `timeout_secs`.
#[must_use]
pub fn create_http_client(timeout_secs: u64) -> HttpClient {
    HttpClient::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .unwrap_or_else(|_| HttpClient::new())
}

/// Sends an HTTP POST request with JSON body and returns parsed JSON response.
///
/// # Errors
///
/// Returns `LlmError::NetworkError` on connectivity issues, `LlmError::ApiError` on non-success status codes,
/// or `LlmError::JsonError` if parsing fails.
pub async fn send_json_request(
    client: &HttpClient,
    url: &str,
    body: &Value,
    auth_header: Option<&str>,
    extra_headers: &[(&str, &str)],
) -> Result<Value, LlmError> {
    let mut request = client.post(url).json(body);

    if let Some(auth) = auth_header {
        request = request.header("Authorization", auth);
    }

    for (key, value) in extra_headers {
        request = request.header(*key, *value);
    }

    let response = request
        .send()
        .await
        .map_err(|e| LlmError::NetworkError(e.to_string()))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(LlmError::ApiError(describe_http_error(status, &error_text)));
    }

    response
        .json()
        .await
        .map_err(|e| LlmError::JsonError(e.to_string()))
}

/// Builds a short error message from a failed response body
#[must_use]
pub fn describe_http_error(status: reqwest::StatusCode, body: &str) -> String {
    let trimmed = body.trim_start();
    // Proxies answer with HTML pages; never echo those
    if trimmed.starts_with("<!DOCTYPE") || trimmed.starts_with("<html") || trimmed.starts_with("<HTML")
    {
        return format!("API error: {status} (Server returned HTML error page)");
    }
    if body.chars().count() > 500 {
        format!(
            "API error: {status} - {}... (truncated)",
            crate::utils::truncate_str(body, 500)
        )
    } else {
        format!("API error: {status} - {body}")
    }
}

/// Extracts text content from a JSON response by navigating a path.
///
/// # Example
/// ```ignore
/// // Gemini: ["candidates", "0", "content", "parts", "0", "text"]
/// let content = extract_text_content(&response, &["candidates", "0", "content", "parts", "0", "text"])?;
/// ```
///
/// # Errors
///
/// Returns `LlmError::ApiError` if the path is invalid or the target is not a string.
pub fn extract_text_content(response: &Value, path: &[&str]) -> Result<String, LlmError> {
    let mut current = response;

    for segment in path {
        if let Ok(index) = segment.parse::<usize>() {
            current = current.get(index).ok_or_else(|| {
                LlmError::ApiError(format!("Invalid path: missing index {index}"))
            })?;
        } else {
            current = current.get(*segment).ok_or_else(|| {
                LlmError::ApiError(format!("Invalid path: missing key {segment}"))
            })?;
        }
    }

    current
        .as_str()
        .map(ToString::to_string)
        .ok_or_else(|| LlmError::ApiError(format!("Expected string at path, got: {current:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use serde_json::json;

    #[test]
    fn test_extract_text_content_gemini_format() -> Result<(), LlmError> {
        let response = json!({
            "candidates": [{
                "content": {
                    "parts": [{
                        "text": "Gemini response"
                    }]
                }
            }]
        });

        let result = extract_text_content(
            &response,
            &["candidates", "0", "content", "parts", "0", "text"],
        )?;
        assert_eq!(result, "Gemini response");
        Ok(())
    }

    #[test]
    fn test_extract_text_content_missing_path() {
        let response = json!({"foo": "bar"});
        assert!(extract_text_content(&response, &["missing", "path"]).is_err());
    }

    #[test]
    fn test_describe_http_error_hides_html() {
        let message = describe_http_error(StatusCode::BAD_GATEWAY, "<html><body>oops</body></html>");
        assert!(message.contains("502"));
        assert!(!message.contains("oops"));
    }

    #[test]
    fn test_describe_http_error_truncates() {
        let message = describe_http_error(StatusCode::BAD_REQUEST, &"x".repeat(2000));
        assert!(message.ends_with("(truncated)"));
        assert!(message.len() < 600);
    }
}
