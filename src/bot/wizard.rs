//! Image generation wizard: prompt, then size, then style, then generate.
//!
//! [`advance`] is the pure transition function; [`ImageWizard`] applies its
//! result to the session registry and talks to the chat and the generator.

use crate::bot::state::{SessionKey, SessionRegistry, SessionState};
use crate::bot::transport::{ChatAction, ChatTransport, TextFormat, TransportError};
use crate::bot::views;
use crate::providers::ImageGenerator;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The three values collected by the wizard
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageRequest {
    /// What to draw
    pub prompt: String,
    /// Size name or ratio, passed through verbatim
    pub size: String,
    /// Style preset, passed through verbatim
    pub style: String,
}

/// What the executor has to do after a transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WizardStep {
    /// Offer the size menu
    AskSize,
    /// Offer the style menu
    AskStyle,
    /// Run the generator
    Generate(ImageRequest),
    /// The text is not wizard input
    NotConsumed,
}

/// Transition for a plain text message.
///
/// Returns the next state and the step to perform. Unknown sizes and styles
/// are accepted as typed.
#[must_use]
pub fn advance(state: SessionState, text: &str) -> (SessionState, WizardStep) {
    let text = text.to_string();
    match state {
        SessionState::AwaitingPrompt => (
            SessionState::AwaitingSize { prompt: text },
            WizardStep::AskSize,
        ),
        SessionState::AwaitingSize { prompt } => (
            SessionState::AwaitingStyle { prompt, size: text },
            WizardStep::AskStyle,
        ),
        SessionState::AwaitingStyle { prompt, size } => {
            let request = ImageRequest {
                prompt: prompt.clone(),
                size: size.clone(),
                style: text.clone(),
            };
            (
                SessionState::Processing {
                    prompt,
                    size,
                    style: text,
                },
                WizardStep::Generate(request),
            )
        }
        idle_or_busy @ (SessionState::Idle | SessionState::Processing { .. }) => {
            (idle_or_busy, WizardStep::NotConsumed)
        }
    }
}

/// Runs the wizard for every chat
pub struct ImageWizard {
    sessions: Arc<SessionRegistry>,
    transport: Arc<dyn ChatTransport>,
    generator: Arc<dyn ImageGenerator>,
}

impl ImageWizard {
    /// Wizard backed by the given collaborators
    #[must_use]
    pub fn new(
        sessions: Arc<SessionRegistry>,
        transport: Arc<dyn ChatTransport>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        Self {
            sessions,
            transport,
            generator,
        }
    }

    /// Handles `/image`. Unauthorized callers stay idle and get the denial.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt could not be sent.
    pub async fn start(&self, key: SessionKey, authorized: bool) -> Result<(), TransportError> {
        if !authorized {
            self.transport
                .send_text(key.chat_id, views::ACCESS_DENIED, TextFormat::Plain, None)
                .await?;
            return Ok(());
        }
        info!(user_id = key.user_id, "Image wizard started");
        self.sessions.set(key, SessionState::AwaitingPrompt).await;
        self.transport
            .send_notice(key.chat_id, views::IMAGE_PROMPT)
            .await?;
        Ok(())
    }

    /// Feeds a plain text message to the wizard.
    ///
    /// Returns `false` when no wizard is waiting for input, so the caller can
    /// treat the text as conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if a menu or result could not be sent. The session is
    /// back to `Idle` after a generation attempt whatever the outcome.
    pub async fn on_text(&self, key: SessionKey, text: &str) -> Result<bool, TransportError> {
        let current = self.sessions.get(key).await;
        let (next, step) = advance(current, text);
        match step {
            WizardStep::NotConsumed => Ok(false),
            WizardStep::AskSize => {
                self.sessions.set(key, next).await;
                self.transport
                    .send_menu(key.chat_id, views::IMAGE_SIZE, &views::size_menu())
                    .await?;
                Ok(true)
            }
            WizardStep::AskStyle => {
                self.sessions.set(key, next).await;
                self.transport
                    .send_menu(key.chat_id, views::IMAGE_STYLE, &views::style_menu())
                    .await?;
                Ok(true)
            }
            WizardStep::Generate(request) => {
                self.sessions.set(key, next).await;
                let result = self.generate(key.chat_id, &request).await;
                self.sessions.clear(key).await;
                result.map(|()| true)
            }
        }
    }

    /// Handles `/cancel`: any running wizard returns to `Idle`
    ///
    /// # Errors
    ///
    /// Returns an error if the confirmation could not be sent.
    pub async fn cancel(&self, key: SessionKey) -> Result<(), TransportError> {
        let text = if self.sessions.clear(key).await {
            info!(user_id = key.user_id, "Image wizard cancelled");
            views::WIZARD_CANCELLED
        } else {
            views::NOTHING_TO_CANCEL
        };
        self.transport.send_notice(key.chat_id, text).await?;
        Ok(())
    }

    /// Drops a running wizard without replying
    pub async fn reset(&self, key: SessionKey) {
        self.sessions.clear(key).await;
    }

    async fn generate(&self, chat_id: i64, request: &ImageRequest) -> Result<(), TransportError> {
        let notice = self
            .transport
            .send_notice(chat_id, views::IMAGE_PROCESSING)
            .await?;
        if let Err(e) = self
            .transport
            .send_chat_action(chat_id, ChatAction::UploadPhoto)
            .await
        {
            warn!("Failed to send chat action: {e}");
        }

        match self
            .generator
            .generate(&request.prompt, &request.style, &request.size)
            .await
        {
            Ok(artifact) => {
                let sent = self.transport.send_photo(chat_id, artifact.path()).await;
                artifact.discard().await;
                sent?;
                if let Err(e) = self.transport.delete_message(notice).await {
                    warn!("Failed to delete processing notice: {e}");
                }
                info!(chat_id, "Image sent");
                Ok(())
            }
            Err(e) => {
                error!(chat_id, "Image generation failed: {e}");
                self.transport
                    .send_notice(chat_id, views::IMAGE_FAILED)
                    .await?;
                Ok(())
            }
        }
    }
}
