use crate::artifact::Artifact;
use crate::llm::http_utils::{create_http_client, describe_http_error};
use crate::providers::translate::ENGLISH;
use crate::providers::ProviderError;
use crate::utils::retry_once;
use async_trait::async_trait;
use lazy_regex::lazy_regex;
use reqwest::Client as HttpClient;
use std::path::PathBuf;
use tracing::debug;

const TTS_URL: &str = "https://translate.google.com/translate_tts";

/// Longest text the TTS endpoint accepts in one request
pub const MAX_SEGMENT_CHARS: usize = 200;

/// Spoken instead of an empty reply
const NOTHING_TO_SAY: &str = "There has been no response at the moment.";

const UNSPOKEN_CHARS: &[char] = &[
    '`', '#', '$', '^', '<', '>', '*', '_', '/', '\\', '{', '}', '[', ']', '|', '~',
];

#[allow(clippy::non_std_lazy_statics)]
static RE_REFERENCE_LINK: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r#"\[\d+\]:\s+https?://\S+\s+""\n"#);
#[allow(clippy::non_std_lazy_statics)]
static RE_URL: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"https?://\S+|www\.\S+");
#[allow(clippy::non_std_lazy_statics)]
static RE_FOOTNOTE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\[\^\d+\^\] \[\d+\]");
#[allow(clippy::non_std_lazy_statics)]
static RE_WHITESPACE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\s+");

/// Speech synthesis collaborator
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Renders `text` spoken in `lang` into an audio artifact
    async fn synthesize(&self, text: &str, lang: &str) -> Result<Artifact, ProviderError>;
}

/// Strips everything that should not be read aloud.
///
/// Reference links, URLs and markdown punctuation are removed and runs of
/// whitespace collapse to one space. English text also loses non-ASCII
/// characters (emoji, decorations).
#[must_use]
pub fn prepare_speech_text(text: &str, lang: &str) -> String {
    let text = RE_REFERENCE_LINK.replace_all(text, "");
    let text = RE_URL.replace_all(&text, "");
    let text = RE_FOOTNOTE.replace_all(&text, "");
    let text: String = text
        .chars()
        .filter(|c| !UNSPOKEN_CHARS.contains(c))
        .filter(|c| lang != ENGLISH || c.is_ascii())
        .collect();
    RE_WHITESPACE.replace_all(&text, " ").trim().to_string()
}

/// Splits text on word boundaries into pieces of at most `max_chars` characters.
///
/// A single word longer than the limit is cut hard.
#[must_use]
pub fn segment_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let rest = word.split_off(max_chars);
            segments.push(word.into_iter().collect());
            word = rest;
        }
        if word.is_empty() {
            continue;
        }
        let extra = word.len() + usize::from(current_len > 0);
        if current_len + extra > max_chars {
            segments.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.extend(word.iter());
        current_len += word.len();
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Client for the Google translate TTS endpoint
pub struct GoogleSpeech {
    http_client: HttpClient,
    artifacts_dir: PathBuf,
}

impl GoogleSpeech {
    /// Create a synthesizer writing its mp3 files into `artifacts_dir`
    #[must_use]
    pub fn new(artifacts_dir: PathBuf, timeout_secs: u64) -> Self {
        Self {
            http_client: create_http_client(timeout_secs),
            artifacts_dir,
        }
    }

    async fn fetch_segment(
        &self,
        segment: &str,
        lang: &str,
        index: usize,
        total: usize,
    ) -> Result<Vec<u8>, ProviderError> {
        let length = segment.chars().count().to_string();
        let index = index.to_string();
        let total = total.to_string();
        let response = self
            .http_client
            .get(TTS_URL)
            .query(&[
                ("ie", "UTF-8"),
                ("client", "tw-ob"),
                ("tl", lang),
                ("q", segment),
                ("textlen", length.as_str()),
                ("idx", index.as_str()),
                ("total", total.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api(describe_http_error(status, &body)));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleSpeech {
    async fn synthesize(&self, text: &str, lang: &str) -> Result<Artifact, ProviderError> {
        let mut prepared = prepare_speech_text(text, lang);
        if prepared.is_empty() {
            prepared = NOTHING_TO_SAY.to_string();
        }
        let segments = segment_text(&prepared, MAX_SEGMENT_CHARS);
        debug!(lang, segments = segments.len(), "Synthesizing speech");

        let mut audio = Vec::new();
        for (index, segment) in segments.iter().enumerate() {
            let bytes = retry_once("Speech synthesis", || {
                self.fetch_segment(segment, lang, index, segments.len())
            })
            .await?;
            audio.extend_from_slice(&bytes);
        }

        Ok(Artifact::write(&self.artifacts_dir, "mp3", &audio).await?)
    }
}
