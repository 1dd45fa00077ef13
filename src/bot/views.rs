//! User-facing texts, menus and button layouts.

use crate::bot::callback::{CallbackAction, CallbackToken, TextAction};
use crate::bot::transport::Menu;

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Sent to users outside the allow list
pub const ACCESS_DENIED: &str =
    "Apologies, you lack the necessary authorization to utilize my services.";
/// Sent when an unauthorized user presses a button
pub const FEATURE_DENIED: &str = "Sorry, you are not authorized to use this feature";
/// Sent to non-admins trying admin commands
pub const ADMIN_ONLY: &str =
    "Apologies, but access to this command is restricted to administrators only.";
/// Substituted for an absent or empty reply
pub const UNEXPECTED_PROBLEM: &str =
    "I'm sorry, but an unexpected problem has occurred. If you wish, you can try again later.";
/// Last-resort notice when delivery keeps failing
pub const NO_RESPONSE: &str = "there has been no response at the moment";
/// Reply to an undecodable button payload
pub const USER_INFO_UNAVAILABLE: &str = "User information not available.";
/// Reply to commands that need an argument
pub const MISSING_ARGUMENT: &str = "Please pass your argument directly after the command.";
/// Reply to endpoint failures
pub const GENERIC_ERROR: &str = "Sorry, something went wrong. Please try again later.";
/// Sent when `/reset` could not rebuild the model client
pub const RESET_FAILED: &str = "Reset failed, the previous session is still active.";
/// Sent by `/healthcheck`
pub const HEALTHY: &str = "OK";

/// First wizard prompt
pub const IMAGE_PROMPT: &str = "Please enter a prompt for the image generation:";
/// Second wizard prompt
pub const IMAGE_SIZE: &str = "Please select the preferred size for the image:";
/// Third wizard prompt
pub const IMAGE_STYLE: &str = "Please select a style for the image:";
/// Shown while the image is being generated
pub const IMAGE_PROCESSING: &str = "Processing...";
/// Sent when generation fails
pub const IMAGE_FAILED: &str =
    "Sorry, there was an error generating the image. Please try again using another prompt.";
/// Sent by `/cancel` inside the wizard
pub const WIZARD_CANCELLED: &str = "Image generation cancelled.";
/// Sent by `/cancel` outside the wizard
pub const NOTHING_TO_CANCEL: &str = "There is nothing to cancel.";

/// Prefix of `/detailed` questions
pub const DETAILED_TEMPLATE: &str = "give me a detailed possible answer or explanation about";
/// Prefix of `/simple` questions
pub const SIMPLE_TEMPLATE: &str =
    "give me one simple possible answer or explanation (35 word max) about";

/// Reply for a button whose response is no longer stored
#[must_use]
pub fn response_not_found(response_id: i64) -> String {
    format!("Could not find response for data_id {response_id}")
}

/// Reply for a rewrite command with nothing to rewrite
pub const NOTHING_TO_REWRITE: &str =
    "Could not find a previous response. Pass the text directly after the command.";

/// Sent after a successful `/reset`
#[must_use]
pub fn reset_done(persona: &str) -> String {
    format!(
        "{persona} has been reset. You can now use \"/start\" to re-initialize me for a new \
         conversation."
    )
}

/// `/start` greeting
#[must_use]
pub fn greeting(first_name: &str, persona: &str) -> String {
    format!(
        "🌸 Greetings {first_name}, I'm {persona}AI, \nyour savvy companion. How may I assist you \
         today? 💬 \nUse \"/help\" to unveil my command prowess. Let's dive into the world of \
         possibilities together! 🚀✨"
    )
}

/// `/help` text
#[must_use]
pub fn help_text(persona: &str) -> String {
    [
        format!(
            "🌸 Explore the blossoming possibilities with {persona}AI Bloom! Here are the commands at your service: 😊"
        ),
        "\n1. Operation mode 📳".to_string(),
        "- /paraphrase - Transform your input or my latest response.".to_string(),
        "- /summarize  - Condense your input or my latest response.".to_string(),
        "- /elaborate  - Expand on your input or my latest response.".to_string(),
        "- /generalize - Generalize your input or my latest response.".to_string(),
        "- /image - Generate an image from text.".to_string(),
        "- /cancel - Stop the image generation.".to_string(),
        "\n2. Question And Answer 🤓".to_string(),
        "- /detailed - Seek a detailed answer.".to_string(),
        "- /simple   - Request a straightforward answer.".to_string(),
        "\n3. System Set ⚙️".to_string(),
        "- /start - Initiate a conversation with me.".to_string(),
        "- /help  - Reveal this helpful menu.".to_string(),
        "- /reset - Reset me for re-initialization.".to_string(),
        "\nHow may I assist you further on this blooming journey? 💬🌸".to_string(),
    ]
    .join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyboards
// ─────────────────────────────────────────────────────────────────────────────

/// Image size choices
pub const SIZE_CHOICES: &[&[&str]] = &[
    &["landscape", "widescreen", "panorama"],
    &["square-l", "square", "square-p"],
    &["portrait", "highscreen", "panorama-p"],
];

/// Image style choices; "None" means no preset
pub const STYLE_CHOICES: &[&[&str]] = &[
    &["photographic", "enhance", "anime"],
    &["digital-art", "comic-book", "fantasy-art"],
    &["line-art", "analog-film", "neon-punk"],
    &["isometric", "low-poly", "origami"],
    &["modeling-compound", "cinematic", "3d-model"],
    &["pixel-art", "tile-texture", "None"],
];

/// Menu offered after the prompt
#[must_use]
pub fn size_menu() -> Menu {
    Menu::from_static(SIZE_CHOICES)
}

/// Menu offered after the size
#[must_use]
pub fn style_menu() -> Menu {
    Menu::from_static(STYLE_CHOICES)
}

/// Inline buttons under the last chunk of a response: `(label, payload)` rows
#[must_use]
pub fn action_buttons(response_id: i64) -> Vec<Vec<(&'static str, String)>> {
    let button = |label, action| (label, CallbackToken::new(action, response_id).encode());
    vec![
        vec![
            button("🔊 voice", CallbackAction::Tts),
            button("📝 elaborate", CallbackAction::Text(TextAction::Elaborate)),
        ],
        vec![
            button("🗞️ summary", CallbackAction::Text(TextAction::Summarize)),
            button("✍🏻 paraphrase", CallbackAction::Text(TextAction::Paraphrase)),
        ],
    ]
}
