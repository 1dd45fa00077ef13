use crate::bot::callback::TextAction;
use crate::bot::delivery::DeliveryPipeline;
use crate::bot::router::CallbackRouter;
use crate::bot::state::SessionKey;
use crate::bot::transport::{ChatAction, ChatTransport, TextFormat};
use crate::bot::views;
use crate::bot::watchdog::Liveness;
use crate::bot::wizard::ImageWizard;
use crate::config::AccessList;
use crate::llm::{LlmProvider, ModelHandle};
use crate::providers::Translator;
use anyhow::Result;
use lazy_regex::lazy_regex;
use regex::NoExpand;
use std::sync::Arc;
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

#[allow(clippy::non_std_lazy_statics)]
static RE_MODEL_SELF_REFERENCE: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"(?i)\bI am a large language model\b");

/// Supported commands for the bot
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Greeting
    #[command(description = "Initiate a conversation.")]
    Start,
    /// Command overview
    #[command(description = "Reveal the command menu.")]
    Help,
    /// Rebuild the model client (admins)
    #[command(description = "Reset the assistant.")]
    Reset,
    /// Detailed answer to a question
    #[command(description = "Seek a detailed answer.")]
    Detailed(String),
    /// Short answer to a question
    #[command(description = "Request a straightforward answer.")]
    Simple(String),
    /// Condense text or the latest reply
    #[command(description = "Condense your input or my latest response.")]
    Summarize(String),
    /// Reword text or the latest reply
    #[command(description = "Transform your input or my latest response.")]
    Paraphrase(String),
    /// Expand text or the latest reply
    #[command(description = "Expand on your input or my latest response.")]
    Elaborate(String),
    /// Generalize text or the latest reply
    #[command(description = "Generalize your input or my latest response.")]
    Generalize(String),
    /// Start the image wizard
    #[command(description = "Generate an image from text.")]
    Image,
    /// Leave the image wizard
    #[command(description = "Stop the image generation.")]
    Cancel,
    /// Connection status
    #[command(description = "Check bot health.")]
    Healthcheck,
}

/// Sender of an update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Telegram user id
    pub user_id: i64,
    /// Chat the update came from
    pub chat_id: i64,
    /// Display name used in greetings
    pub first_name: String,
}

impl Caller {
    /// Session key of this caller
    #[must_use]
    pub const fn session(&self) -> SessionKey {
        SessionKey::new(self.user_id, self.chat_id)
    }
}

/// Replaces the model's self-description with the persona name
#[must_use]
pub fn apply_persona(text: &str, persona: &str) -> String {
    let replacement = format!("my name is {persona}");
    RE_MODEL_SELF_REFERENCE
        .replace_all(text, NoExpand(&replacement))
        .into_owned()
}

/// True for slash-commands, including ones the bot does not recognize
#[must_use]
pub fn is_command_text(text: &str) -> bool {
    text.trim_start().starts_with('/')
}

/// Everything the update handlers need
pub struct BotContext {
    /// Users allowed to talk to the bot
    pub allowed: AccessList,
    /// Users allowed to run admin commands
    pub admins: AccessList,
    /// Name the bot introduces itself with
    pub persona: String,
    /// Active model client
    pub model: Arc<ModelHandle>,
    /// Translation collaborator
    pub translator: Arc<dyn Translator>,
    /// Outbound messages
    pub transport: Arc<dyn ChatTransport>,
    /// Reply delivery
    pub delivery: Arc<DeliveryPipeline>,
    /// Button and rewrite handling
    pub router: Arc<CallbackRouter>,
    /// Image wizard
    pub wizard: Arc<ImageWizard>,
    /// Connection state kept by the watchdog
    pub liveness: Arc<Liveness>,
}

impl BotContext {
    fn is_user(&self, caller: &Caller) -> bool {
        self.allowed.contains(caller.user_id)
    }

    async fn indicate(&self, chat_id: i64, action: ChatAction) {
        if let Err(e) = self.transport.send_chat_action(chat_id, action).await {
            debug!("Chat action not shown: {e}");
        }
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        self.transport
            .send_text(chat_id, text, TextFormat::Plain, None)
            .await?;
        Ok(())
    }

    /// Plain text from a user: wizard input or conversation.
    ///
    /// # Errors
    ///
    /// Returns an error when a message could not be sent.
    pub async fn handle_text(&self, caller: &Caller, text: &str) -> Result<()> {
        if !self.is_user(caller) {
            info!(user_id = caller.user_id, "Unauthorized message");
            return self.reply(caller.chat_id, views::ACCESS_DENIED).await;
        }
        if is_command_text(text) {
            debug!(user_id = caller.user_id, "Ignoring unrecognized command");
            return Ok(());
        }
        if self.wizard.on_text(caller.session(), text).await? {
            return Ok(());
        }

        self.indicate(caller.chat_id, ChatAction::Typing).await;
        let source = self.translator.to_english(text).await;
        let reply = self.converse(&source.text, &source.lang).await;
        self.delivery
            .deliver(caller.user_id, caller.chat_id, reply.as_deref(), &source.lang)
            .await;
        Ok(())
    }

    /// Asks the chat model and localizes its answer; `None` on model failure
    async fn converse(&self, prompt: &str, lang: &str) -> Option<String> {
        match self.model.generate_conversational(prompt).await {
            Ok(reply) => {
                let reply = apply_persona(&reply, &self.persona);
                Some(self.translator.from_english(&reply, lang).await)
            }
            Err(e) => {
                warn!("Chat model failed: {e}");
                None
            }
        }
    }

    /// Dispatches a parsed command.
    ///
    /// # Errors
    ///
    /// Returns an error when a message could not be sent.
    pub async fn handle_command(&self, caller: &Caller, command: Command) -> Result<()> {
        info!(user_id = caller.user_id, ?command, "Command received");
        match command {
            Command::Start => self.start(caller).await,
            Command::Help => self.help(caller).await,
            Command::Reset => self.reset(caller).await,
            Command::Detailed(question) => {
                self.ask(caller, views::DETAILED_TEMPLATE, &question).await
            }
            Command::Simple(question) => self.ask(caller, views::SIMPLE_TEMPLATE, &question).await,
            Command::Summarize(text) => self.rewrite(caller, TextAction::Summarize, &text).await,
            Command::Paraphrase(text) => self.rewrite(caller, TextAction::Paraphrase, &text).await,
            Command::Elaborate(text) => self.rewrite(caller, TextAction::Elaborate, &text).await,
            Command::Generalize(text) => self.rewrite(caller, TextAction::Generalize, &text).await,
            Command::Image => Ok(self
                .wizard
                .start(caller.session(), self.is_user(caller))
                .await?),
            Command::Cancel => Ok(self.wizard.cancel(caller.session()).await?),
            Command::Healthcheck => {
                let status = if self.liveness.is_alive() {
                    views::HEALTHY
                } else {
                    views::NO_RESPONSE
                };
                self.reply(caller.chat_id, status).await
            }
        }
    }

    /// A pressed inline button.
    ///
    /// # Errors
    ///
    /// Returns an error when a message could not be sent.
    pub async fn handle_callback(&self, caller: &Caller, data: &str) -> Result<()> {
        if !self.is_user(caller) {
            info!(user_id = caller.user_id, "Unauthorized button press");
            return self.reply(caller.chat_id, views::FEATURE_DENIED).await;
        }
        let outcome = self
            .router
            .route(caller.user_id, caller.chat_id, data)
            .await?;
        debug!(user_id = caller.user_id, ?outcome, "Callback handled");
        Ok(())
    }

    async fn start(&self, caller: &Caller) -> Result<()> {
        self.indicate(caller.chat_id, ChatAction::Typing).await;
        if !self.is_user(caller) {
            return self.reply(caller.chat_id, views::ACCESS_DENIED).await;
        }
        self.reply(
            caller.chat_id,
            &views::greeting(&caller.first_name, &self.persona),
        )
        .await
    }

    async fn help(&self, caller: &Caller) -> Result<()> {
        if !self.is_user(caller) {
            return self.reply(caller.chat_id, views::ACCESS_DENIED).await;
        }
        self.reply(caller.chat_id, &views::help_text(&self.persona))
            .await
    }

    async fn reset(&self, caller: &Caller) -> Result<()> {
        if !self.admins.contains(caller.user_id) {
            return self.reply(caller.chat_id, views::ADMIN_ONLY).await;
        }
        self.wizard.reset(caller.session()).await;
        match self.model.reset().await {
            Ok(()) => {
                info!(user_id = caller.user_id, "Model client reset");
                self.reply(caller.chat_id, &views::reset_done(&self.persona))
                    .await
            }
            Err(e) => {
                warn!("Model reset failed: {e}");
                self.reply(caller.chat_id, views::RESET_FAILED).await
            }
        }
    }

    async fn ask(&self, caller: &Caller, template: &str, question: &str) -> Result<()> {
        if !self.is_user(caller) {
            return self.reply(caller.chat_id, views::ACCESS_DENIED).await;
        }
        let question = question.trim();
        if question.is_empty() {
            return self.reply(caller.chat_id, views::MISSING_ARGUMENT).await;
        }
        self.indicate(caller.chat_id, ChatAction::Typing).await;
        let source = self.translator.to_english(question).await;
        let prompt = format!("{template} + {}", source.text);
        let reply = self.converse(&prompt, &source.lang).await;
        self.delivery
            .deliver(caller.user_id, caller.chat_id, reply.as_deref(), &source.lang)
            .await;
        Ok(())
    }

    async fn rewrite(&self, caller: &Caller, action: TextAction, text: &str) -> Result<()> {
        if !self.is_user(caller) {
            return self.reply(caller.chat_id, views::FEATURE_DENIED).await;
        }
        let outcome = self
            .router
            .rewrite_command(caller.user_id, caller.chat_id, action, Some(text))
            .await?;
        debug!(user_id = caller.user_id, ?outcome, "Rewrite command handled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persona_rewrite_is_case_insensitive_and_word_bounded() {
        assert_eq!(
            apply_persona("Hi! i am a LARGE language model, trained by X.", "Sakura"),
            "Hi! my name is Sakura, trained by X."
        );
        assert_eq!(
            apply_persona("I am a large language modeler", "Sakura"),
            "I am a large language modeler"
        );
    }

    #[test]
    fn test_persona_name_is_not_a_replacement_pattern() {
        assert_eq!(apply_persona("I am a large language model", "$1"), "my name is $1");
    }

    #[test]
    fn test_unparsed_commands_are_still_commands() {
        assert!(Command::parse("/help@other_bot", "sakura_bot").is_err());
        assert!(Command::parse("/wiki rust", "sakura_bot").is_err());
        assert!(is_command_text("/help@other_bot"));
        assert!(is_command_text(" /wiki rust"));
        assert!(!is_command_text("a/b testing"));
    }

    #[test]
    fn test_commands_parse_arguments() {
        assert_eq!(
            Command::parse("/detailed why is the sky blue", "sakura_bot").ok(),
            Some(Command::Detailed("why is the sky blue".into()))
        );
        assert_eq!(
            Command::parse("/summarize", "sakura_bot").ok(),
            Some(Command::Summarize(String::new()))
        );
        assert_eq!(Command::parse("/cancel", "sakura_bot").ok(), Some(Command::Cancel));
    }
}
