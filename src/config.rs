//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the timing and sizing constants shared by the bot.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    pub telegram_token: String,

    /// Comma-separated list of user IDs allowed to talk to the bot (`*` for everyone)
    #[serde(rename = "allowed_users")]
    pub allowed_users_str: Option<String>,

    /// Comma-separated list of administrator IDs (`*` for everyone)
    #[serde(rename = "admin_users")]
    pub admin_users_str: Option<String>,

    /// Gemini API key
    pub gemini_api_key: Option<String>,
    /// Gemini model used for conversational replies
    #[serde(default = "default_gemini_chat_model")]
    pub gemini_chat_model: String,
    /// Gemini model used for instruction-style generation
    #[serde(default = "default_gemini_text_model")]
    pub gemini_text_model: String,

    /// API key of an OpenAI-compatible endpoint, used when Gemini is not configured
    pub openai_api_key: Option<String>,
    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_openai_api_base")]
    pub openai_api_base: String,
    /// Model name on the OpenAI-compatible endpoint
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Stability AI API key for image generation
    pub stability_api_key: Option<String>,

    /// R2 Storage access key ID
    pub r2_access_key_id: Option<String>,
    /// R2 Storage secret access key
    pub r2_secret_access_key: Option<String>,
    /// R2 Storage endpoint URL
    pub r2_endpoint_url: Option<String>,
    /// R2 Storage bucket name
    pub r2_bucket_name: Option<String>,

    /// Directory for transient audio and image files
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: PathBuf,

    /// Maximum characters per outbound text chunk
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,

    /// Number of stored responses kept per user
    #[serde(default = "default_response_history_limit")]
    pub response_history_limit: usize,

    /// Timeout for every outbound HTTP request to a collaborator
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Interval between transport health checks
    #[serde(default = "default_watchdog_interval_secs")]
    pub watchdog_interval_secs: u64,

    /// Name the bot introduces itself with
    #[serde(default = "default_persona_name")]
    pub persona_name: String,
}

fn default_gemini_chat_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_text_model() -> String {
    "gemini-2.5-flash-lite".to_string()
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_artifacts_dir() -> PathBuf {
    std::env::temp_dir().join("sakura-bot")
}

const fn default_max_message_length() -> usize {
    MAX_MESSAGE_LENGTH
}

const fn default_response_history_limit() -> usize {
    RESPONSE_HISTORY_LIMIT
}

const fn default_http_timeout_secs() -> u64 {
    HTTP_TIMEOUT_SECS
}

const fn default_watchdog_interval_secs() -> u64 {
    WATCHDOG_INTERVAL_SECS
}

fn default_persona_name() -> String {
    "Sakura".to_string()
}

/// Builds the layered configuration source used by [`Settings::new`].
///
/// # Errors
///
/// Returns a `ConfigError` if one of the sources cannot be read.
pub fn build_config() -> Result<Config, ConfigError> {
    let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

    Config::builder()
        // Start off by merging in the "default" configuration file
        .add_source(File::with_name("config/default").required(false))
        // Add in the current environment file
        .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
        // Add in a local configuration file
        // This file shouldn't be checked into git
        .add_source(File::with_name("config/local").required(false))
        // Eg.. `APP__MAX_MESSAGE_LENGTH=2048 ./target/app`
        .add_source(Environment::with_prefix("APP").separator("__"))
        // Plain environment variables; empty values are treated as unset
        .add_source(Environment::default().ignore_empty(true))
        .build()
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sakura_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails.
    pub fn new() -> Result<Self, ConfigError> {
        let mut settings: Self = build_config()?.try_deserialize()?;

        // Fallback for the R2 credentials when the automatic mapping misses them
        for (slot, var) in [
            (&mut settings.r2_endpoint_url, "R2_ENDPOINT_URL"),
            (&mut settings.r2_access_key_id, "R2_ACCESS_KEY_ID"),
            (&mut settings.r2_secret_access_key, "R2_SECRET_ACCESS_KEY"),
            (&mut settings.r2_bucket_name, "R2_BUCKET_NAME"),
        ] {
            if slot.is_none() {
                if let Ok(val) = std::env::var(var) {
                    if !val.is_empty() {
                        *slot = Some(val);
                    }
                }
            }
        }

        Ok(settings)
    }

    /// Returns the access list for normal use of the bot
    #[must_use]
    pub fn allowed_users(&self) -> AccessList {
        AccessList::parse(self.allowed_users_str.as_deref())
    }

    /// Returns the access list for administrator commands
    #[must_use]
    pub fn admin_users(&self) -> AccessList {
        AccessList::parse(self.admin_users_str.as_deref())
    }

    /// Returns `true` when every R2 credential is present
    #[must_use]
    pub fn r2_configured(&self) -> bool {
        self.r2_endpoint_url.is_some()
            && self.r2_access_key_id.is_some()
            && self.r2_secret_access_key.is_some()
            && self.r2_bucket_name.is_some()
    }
}

/// A set of Telegram user IDs, or everyone when the list contains `*`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessList {
    everyone: bool,
    ids: HashSet<i64>,
}

impl AccessList {
    /// Parses a list separated by commas, semicolons or whitespace
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let mut list = Self::default();
        let Some(raw) = raw else {
            return list;
        };
        for token in raw
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|token| !token.is_empty())
        {
            if token == "*" {
                list.everyone = true;
            } else if let Ok(id) = token.parse::<i64>() {
                list.ids.insert(id);
            }
        }
        list
    }

    /// Returns `true` if the user may pass
    #[must_use]
    pub fn contains(&self, user_id: i64) -> bool {
        self.everyone || self.ids.contains(&user_id)
    }

    /// Number of explicitly listed IDs
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns `true` if no one is allowed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.everyone && self.ids.is_empty()
    }
}

/// Default chunk size for outbound text (Telegram's hard limit is 4096)
pub const MAX_MESSAGE_LENGTH: usize = 3000;
/// Telegram's limit on the text of one message, counted after markup is applied
pub const TELEGRAM_TEXT_LIMIT: usize = 4096;
/// Default number of responses remembered per user
pub const RESPONSE_HISTORY_LIMIT: usize = 20;
/// Default timeout for collaborator HTTP calls
pub const HTTP_TIMEOUT_SECS: u64 = 60;
/// Default interval between transport health checks
pub const WATCHDOG_INTERVAL_SECS: u64 = 10;

/// Delay before the single retry of a failed collaborator call
pub const COLLABORATOR_RETRY_DELAY_MS: u64 = 1500;

/// Maximum number of retries for Telegram API operations
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// Initial backoff for Telegram API retries
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Upper bound for Telegram API retry backoff
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

/// Sampling temperature for conversational replies
pub const CHAT_TEMPERATURE: f32 = 0.55;
/// Sampling temperature for instruction-style generation
pub const TEXT_TEMPERATURE: f32 = 0.75;
/// Output token cap for instruction-style generation
pub const TEXT_MAX_OUTPUT_TOKENS: u32 = 1024;
