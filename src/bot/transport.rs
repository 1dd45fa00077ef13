//! Outbound side of the bot.
//!
//! The session logic talks to [`ChatTransport`] only; [`TelegramTransport`]
//! is the teloxide-backed implementation with retries on transient network
//! failures (exponential backoff with jitter).

use crate::bot::views;
use crate::utils::retry_telegram_operation;
use async_trait::async_trait;
use std::path::Path;
use teloxide::prelude::*;
use teloxide::types::{
    ChatAction as TgChatAction, InlineKeyboardButton, InlineKeyboardMarkup, InputFile,
    KeyboardButton, KeyboardMarkup, KeyboardRemove, MessageId, ParseMode,
};
use teloxide::{ApiError, RequestError};
use thiserror::Error;
use tracing::debug;

/// Errors reported by a [`ChatTransport`]
#[derive(Debug, Error)]
pub enum TransportError {
    /// The platform refused the message as formatted (bad markup, too long
    /// or empty once rendered)
    #[error("formatting rejected: {0}")]
    FormattingRejected(String),
    /// Any other delivery failure
    #[error("transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Formatting failures are permanent; everything else may be retried
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Other(_))
    }
}

impl From<RequestError> for TransportError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Api(ApiError::CantParseEntities(e)) => Self::FormattingRejected(e),
            RequestError::Api(e @ (ApiError::MessageIsTooLong | ApiError::MessageTextIsEmpty)) => {
                Self::FormattingRejected(e.to_string())
            }
            RequestError::Api(ApiError::Unknown(e)) if e.contains("can't parse entities") => {
                Self::FormattingRejected(e)
            }
            other => Self::Other(other.to_string()),
        }
    }
}

/// How the text of a message is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextFormat {
    /// Telegram HTML subset
    Html,
    /// No markup
    Plain,
}

/// Activity indicator shown in the chat header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    /// "typing..."
    Typing,
    /// "recording voice..."
    RecordVoice,
    /// "sending photo..."
    UploadPhoto,
}

/// The inline action buttons attached under a stored response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionKeyboard {
    /// Response the buttons act on
    pub response_id: i64,
}

/// One-shot reply keyboard offering fixed choices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Menu {
    /// Button labels, row by row
    pub rows: Vec<Vec<String>>,
}

impl Menu {
    /// Builds a menu from static labels
    #[must_use]
    pub fn from_static(rows: &[&[&str]]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|row| row.iter().map(ToString::to_string).collect())
                .collect(),
        }
    }
}

/// Handle to a message that was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    /// Chat the message lives in
    pub chat_id: i64,
    /// Platform message id
    pub message_id: i32,
}

/// Everything the bot sends to a chat
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Sends one text message, optionally with the action keyboard
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        keyboard: Option<ActionKeyboard>,
    ) -> Result<MessageRef, TransportError>;

    /// Sends a prompt together with a one-shot choice menu
    async fn send_menu(&self, chat_id: i64, text: &str, menu: &Menu) -> Result<(), TransportError>;

    /// Sends a plain notice and removes any reply keyboard
    async fn send_notice(&self, chat_id: i64, text: &str) -> Result<MessageRef, TransportError>;

    /// Deletes a previously sent message
    async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError>;

    /// Uploads an image file
    async fn send_photo(&self, chat_id: i64, path: &Path) -> Result<(), TransportError>;

    /// Uploads an audio file as a voice message
    async fn send_voice(&self, chat_id: i64, path: &Path) -> Result<(), TransportError>;

    /// Shows an activity indicator
    async fn send_chat_action(&self, chat_id: i64, action: ChatAction)
        -> Result<(), TransportError>;

    /// Checks that the platform API is reachable
    async fn health_check(&self) -> Result<(), TransportError>;
}

/// Telegram implementation of [`ChatTransport`]
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Wraps a bot handle
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn inline_keyboard(keyboard: ActionKeyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(
        views::action_buttons(keyboard.response_id)
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|(label, data)| InlineKeyboardButton::callback(label, data))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>(),
    )
}

fn reply_keyboard(menu: &Menu) -> KeyboardMarkup {
    KeyboardMarkup::new(
        menu.rows
            .iter()
            .map(|row| row.iter().map(KeyboardButton::new).collect::<Vec<_>>())
            .collect::<Vec<_>>(),
    )
    .resize_keyboard()
    .one_time_keyboard()
}

const fn telegram_action(action: ChatAction) -> TgChatAction {
    match action {
        ChatAction::Typing => TgChatAction::Typing,
        ChatAction::RecordVoice => TgChatAction::RecordVoice,
        ChatAction::UploadPhoto => TgChatAction::UploadPhoto,
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        format: TextFormat,
        keyboard: Option<ActionKeyboard>,
    ) -> Result<MessageRef, TransportError> {
        let sent = retry_telegram_operation(
            || async {
                let mut req = self.bot.send_message(ChatId(chat_id), text);
                if format == TextFormat::Html {
                    req = req.parse_mode(ParseMode::Html);
                }
                if let Some(keyboard) = keyboard {
                    req = req.reply_markup(inline_keyboard(keyboard));
                }
                req.await.map_err(TransportError::from)
            },
            TransportError::is_transient,
        )
        .await?;
        Ok(MessageRef {
            chat_id,
            message_id: sent.id.0,
        })
    }

    async fn send_menu(&self, chat_id: i64, text: &str, menu: &Menu) -> Result<(), TransportError> {
        retry_telegram_operation(
            || async {
                self.bot
                    .send_message(ChatId(chat_id), text)
                    .reply_markup(reply_keyboard(menu))
                    .await
                    .map_err(TransportError::from)
            },
            TransportError::is_transient,
        )
        .await?;
        Ok(())
    }

    async fn send_notice(&self, chat_id: i64, text: &str) -> Result<MessageRef, TransportError> {
        let sent = retry_telegram_operation(
            || async {
                self.bot
                    .send_message(ChatId(chat_id), text)
                    .reply_markup(KeyboardRemove::new())
                    .await
                    .map_err(TransportError::from)
            },
            TransportError::is_transient,
        )
        .await?;
        Ok(MessageRef {
            chat_id,
            message_id: sent.id.0,
        })
    }

    async fn delete_message(&self, message: MessageRef) -> Result<(), TransportError> {
        self.bot
            .delete_message(ChatId(message.chat_id), MessageId(message.message_id))
            .await?;
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, path: &Path) -> Result<(), TransportError> {
        retry_telegram_operation(
            || async {
                self.bot
                    .send_photo(ChatId(chat_id), InputFile::file(path))
                    .await
                    .map_err(TransportError::from)
            },
            TransportError::is_transient,
        )
        .await?;
        Ok(())
    }

    async fn send_voice(&self, chat_id: i64, path: &Path) -> Result<(), TransportError> {
        retry_telegram_operation(
            || async {
                self.bot
                    .send_voice(ChatId(chat_id), InputFile::file(path))
                    .await
                    .map_err(TransportError::from)
            },
            TransportError::is_transient,
        )
        .await?;
        Ok(())
    }

    async fn send_chat_action(
        &self,
        chat_id: i64,
        action: ChatAction,
    ) -> Result<(), TransportError> {
        self.bot
            .send_chat_action(ChatId(chat_id), telegram_action(action))
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), TransportError> {
        let me = self.bot.get_me().await?;
        debug!("Health check ok for @{}", me.username());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entity_errors_are_formatting_rejections() {
        let err = TransportError::from(RequestError::Api(ApiError::CantParseEntities(
            "Bad Request: can't parse entities".into(),
        )));
        assert!(matches!(err, TransportError::FormattingRejected(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_length_and_empty_text_errors_are_not_retried() {
        for api in [ApiError::MessageIsTooLong, ApiError::MessageTextIsEmpty] {
            let err = TransportError::from(RequestError::Api(api));
            assert!(matches!(err, TransportError::FormattingRejected(_)));
            assert!(!err.is_transient());
        }
    }

    #[test]
    fn test_other_api_errors_are_transient() {
        let err = TransportError::from(RequestError::Api(ApiError::BotBlocked));
        assert!(err.is_transient());
    }

    #[test]
    fn test_inline_keyboard_carries_response_id() {
        let markup = inline_keyboard(ActionKeyboard { response_id: 42 });
        let buttons: Vec<_> = markup.inline_keyboard.iter().flatten().collect();
        assert_eq!(buttons.len(), 4);
        assert!(buttons.iter().all(|b| match &b.kind {
            teloxide::types::InlineKeyboardButtonKind::CallbackData(data) => data.ends_with("_42"),
            _ => false,
        }));
    }

    #[test]
    fn test_menu_rows_become_reply_keyboard() {
        let menu = Menu::from_static(&[&["a", "b"], &["c"]]);
        let markup = reply_keyboard(&menu);
        assert_eq!(markup.keyboard.len(), 2);
        assert_eq!(markup.keyboard[0][1].text, "b");
    }
}
