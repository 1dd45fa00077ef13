use crate::artifact::Artifact;
use crate::llm::http_utils::{create_http_client, extract_text_content, send_json_request};
use crate::providers::ProviderError;
use crate::utils::retry_once;
use async_trait::async_trait;
use base64::Engine as _;
use reqwest::Client as HttpClient;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

const STABILITY_URL: &str =
    "https://api.stability.ai/v1/generation/stable-diffusion-xl-1024-v1-0/text-to-image";

/// Style value meaning "no preset"
pub const NO_STYLE: &str = "None";

const QUALITY_PROMPT: &str = "The artwork showcases excellent anatomy with a clear, complete, \
and appealing depiction. It has well-proportioned and polished details, presenting a unique and \
balanced composition. The high-resolution image is undamaged and well-formed, conveying a healthy \
and natural appearance without mutations or blemishes. The positive aspect of the artwork is \
highlighted by its skillful framing and realistic features, including a well-drawn face and hands. \
The absence of signatures contributes to its seamless and authentic quality, and the depiction of \
straight fingers adds to its overall attractiveness.";

const NEGATIVE_PROMPT: &str = "2 faces, 2 heads, bad anatomy, blurry, cloned face, cropped image, \
cut-off, deformed hands, disconnected limbs, disgusting, disfigured, draft, duplicate artifact, \
extra fingers, extra limb, floating limbs, gloss proportions, grain, gross proportions, long body, \
long neck, low-res, mangled, malformed, malformed hands, missing arms, missing limb, morbid, \
mutation, mutated, mutated hands, mutilated, mutilated hands, multiple heads, negative aspect, \
out of frame, poorly drawn, poorly drawn face, poorly drawn hands, signatures, surreal, tiling, \
twisted fingers, ugly";

/// Image generation collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Renders `prompt` with the given style preset and size into an image artifact
    async fn generate(
        &self,
        prompt: &str,
        style: &str,
        size: &str,
    ) -> Result<Artifact, ProviderError>;
}

/// SDXL `(width, height)` for a menu size name or an aspect ratio.
///
/// Unknown values yield `None` and the request goes out without dimensions.
#[must_use]
pub fn dimensions_for(size: &str) -> Option<(u32, u32)> {
    let ratio = match size.trim().to_lowercase().as_str() {
        "landscape" | "5:4" => "5:4",
        "square-l" | "11:8" => "11:8",
        "widescreen" | "16:9" => "16:9",
        "panorama" | "8:3" => "8:3",
        "square" | "1:1" => "1:1",
        "panorama-p" | "3:8" => "3:8",
        "portrait" | "4:5" => "4:5",
        "square-p" | "8:11" => "8:11",
        "highscreen" | "9:16" => "9:16",
        _ => return None,
    };
    let dims = match ratio {
        "5:4" => (1152, 896),
        "11:8" => (1216, 832),
        "16:9" => (1344, 768),
        "8:3" => (1536, 640),
        "3:8" => (640, 1536),
        "4:5" => (896, 1152),
        "8:11" => (832, 1216),
        "9:16" => (768, 1344),
        _ => (1024, 1024),
    };
    Some(dims)
}

/// Builds the text-to-image request body
#[must_use]
pub fn request_body(prompt: &str, style: &str, size: &str) -> Value {
    let mut body = json!({
        "samples": 1,
        "steps": 45,
        "cfg_scale": 3.7,
        "text_prompts": [
            {"text": prompt, "weight": 0.9},
            {"text": QUALITY_PROMPT, "weight": 0.1},
            {"text": NEGATIVE_PROMPT, "weight": -1},
        ],
    });
    if let Some((width, height)) = dimensions_for(size) {
        body["width"] = json!(width);
        body["height"] = json!(height);
    }
    let style = style.trim();
    if !style.is_empty() && style != NO_STYLE {
        body["style_preset"] = json!(style);
    }
    body
}

/// Stability AI SDXL client
pub struct StabilityImageGenerator {
    http_client: HttpClient,
    api_key: Option<String>,
    artifacts_dir: PathBuf,
}

impl StabilityImageGenerator {
    /// Create a generator writing its png files into `artifacts_dir`
    #[must_use]
    pub fn new(api_key: Option<String>, artifacts_dir: PathBuf, timeout_secs: u64) -> Self {
        Self {
            http_client: create_http_client(timeout_secs),
            api_key,
            artifacts_dir,
        }
    }
}

#[async_trait]
impl ImageGenerator for StabilityImageGenerator {
    async fn generate(
        &self,
        prompt: &str,
        style: &str,
        size: &str,
    ) -> Result<Artifact, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingConfig("STABILITY_API_KEY".to_string()))?;
        let auth = format!("Bearer {api_key}");
        let body = request_body(prompt, style, size);

        info!(style, size, "Requesting image generation");
        let response = retry_once("Image generation", || {
            send_json_request(
                &self.http_client,
                STABILITY_URL,
                &body,
                Some(&auth),
                &[("Accept", "application/json")],
            )
        })
        .await?;

        let encoded = extract_text_content(&response, &["artifacts", "0", "base64"])?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(Artifact::write(&self.artifacts_dir, "png", &bytes).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_names_map_to_sdxl_dimensions() {
        assert_eq!(dimensions_for("landscape"), Some((1152, 896)));
        assert_eq!(dimensions_for("widescreen"), Some((1344, 768)));
        assert_eq!(dimensions_for("square"), Some((1024, 1024)));
        assert_eq!(dimensions_for("highscreen"), Some((768, 1344)));
        assert_eq!(dimensions_for("panorama-p"), Some((640, 1536)));
        assert_eq!(dimensions_for("16:9"), Some((1344, 768)));
    }

    #[test]
    fn test_unknown_size_sends_no_dimensions() {
        assert_eq!(dimensions_for("gigantic"), None);
        let body = request_body("a cat", "anime", "gigantic");
        assert!(body.get("width").is_none());
        assert!(body.get("height").is_none());
        assert_eq!(body["style_preset"], "anime");
    }

    #[test]
    fn test_none_style_sends_no_preset() {
        let body = request_body("a cat", NO_STYLE, "portrait");
        assert!(body.get("style_preset").is_none());
        assert_eq!(body["width"], 896);
        assert_eq!(body["height"], 1152);
        assert_eq!(body["text_prompts"][0]["text"], "a cat");
        assert_eq!(body["text_prompts"][2]["weight"], -1);
    }

    #[tokio::test]
    async fn test_missing_key_fails_without_request() {
        let generator = StabilityImageGenerator::new(None, std::env::temp_dir(), 1);
        let result = generator.generate("a cat", NO_STYLE, "square").await;
        assert!(matches!(result, Err(ProviderError::MissingConfig(_))));
    }
}
