//! Button presses and rewrite commands acting on stored replies.

use crate::bot::callback::{CallbackAction, CallbackToken, TextAction};
use crate::bot::delivery::{DeliveryOutcome, DeliveryPipeline};
use crate::bot::transport::{ChatAction, ChatTransport, TextFormat, TransportError};
use crate::bot::views;
use crate::llm::LlmProvider;
use crate::providers::{SpeechSynthesizer, Translator};
use crate::storage::{ResponseEntry, ResponseStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a routed request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Payload could not be decoded
    Malformed,
    /// The referenced reply is not stored (evicted or never existed)
    NotFound,
    /// A voice message was sent
    Spoken,
    /// A rewritten reply went through the delivery pipeline
    Rewritten(DeliveryOutcome),
    /// A collaborator failed and the user got the problem notice
    Failed,
}

/// Dispatches decoded actions to the collaborators
pub struct CallbackRouter {
    store: Arc<dyn ResponseStore>,
    text_model: Arc<dyn LlmProvider>,
    translator: Arc<dyn Translator>,
    speech: Arc<dyn SpeechSynthesizer>,
    transport: Arc<dyn ChatTransport>,
    delivery: Arc<DeliveryPipeline>,
}

impl CallbackRouter {
    /// Router over the given collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn ResponseStore>,
        text_model: Arc<dyn LlmProvider>,
        translator: Arc<dyn Translator>,
        speech: Arc<dyn SpeechSynthesizer>,
        transport: Arc<dyn ChatTransport>,
        delivery: Arc<DeliveryPipeline>,
    ) -> Self {
        Self {
            store,
            text_model,
            translator,
            speech,
            transport,
            delivery,
        }
    }

    /// Handles a button payload pressed by `user_id` in `chat_id`.
    ///
    /// # Errors
    ///
    /// Returns an error only when a notice to the user could not be sent.
    pub async fn route(
        &self,
        user_id: i64,
        chat_id: i64,
        data: &str,
    ) -> Result<RouteOutcome, TransportError> {
        let token = match CallbackToken::parse(data) {
            Ok(token) => token,
            Err(e) => {
                warn!(user_id, "Rejected callback payload: {e}");
                self.notify(chat_id, views::USER_INFO_UNAVAILABLE).await?;
                return Ok(RouteOutcome::Malformed);
            }
        };
        info!(user_id, response_id = token.response_id, action = %token, "Callback received");

        let entry = match self.store.get_by_id(user_id, token.response_id).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                self.notify(chat_id, &views::response_not_found(token.response_id))
                    .await?;
                return Ok(RouteOutcome::NotFound);
            }
            Err(e) => {
                error!(user_id, "Response lookup failed: {e}");
                self.notify(chat_id, views::UNEXPECTED_PROBLEM).await?;
                return Ok(RouteOutcome::Failed);
            }
        };

        match token.action {
            CallbackAction::Tts => self.speak(chat_id, &entry).await,
            CallbackAction::Text(action) => Ok(RouteOutcome::Rewritten(
                self.rewrite(user_id, chat_id, action, &entry.text, &entry.lang)
                    .await,
            )),
        }
    }

    /// Handles `/summarize`, `/paraphrase`, `/elaborate` and `/generalize`.
    ///
    /// Explicit text is translated to English first; without it the user's
    /// latest stored reply is used.
    ///
    /// # Errors
    ///
    /// Returns an error only when a notice to the user could not be sent.
    pub async fn rewrite_command(
        &self,
        user_id: i64,
        chat_id: i64,
        action: TextAction,
        text: Option<&str>,
    ) -> Result<RouteOutcome, TransportError> {
        if let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) {
            let source = self.translator.to_english(text).await;
            return Ok(RouteOutcome::Rewritten(
                self.rewrite(user_id, chat_id, action, &source.text, &source.lang)
                    .await,
            ));
        }

        match self.store.get_latest(user_id).await {
            Ok(Some(entry)) => Ok(RouteOutcome::Rewritten(
                self.rewrite(user_id, chat_id, action, &entry.text, &entry.lang)
                    .await,
            )),
            Ok(None) => {
                self.notify(chat_id, views::NOTHING_TO_REWRITE).await?;
                Ok(RouteOutcome::NotFound)
            }
            Err(e) => {
                error!(user_id, "Latest response lookup failed: {e}");
                self.notify(chat_id, views::UNEXPECTED_PROBLEM).await?;
                Ok(RouteOutcome::Failed)
            }
        }
    }

    async fn speak(
        &self,
        chat_id: i64,
        entry: &ResponseEntry,
    ) -> Result<RouteOutcome, TransportError> {
        self.indicate(chat_id, ChatAction::RecordVoice).await;
        match self.speech.synthesize(&entry.text, &entry.lang).await {
            Ok(audio) => {
                let sent = self.transport.send_voice(chat_id, audio.path()).await;
                audio.discard().await;
                sent?;
                info!(chat_id, response_id = entry.response_id, "Voice sent");
                Ok(RouteOutcome::Spoken)
            }
            Err(e) => {
                error!(chat_id, "Speech synthesis failed: {e}");
                self.notify(chat_id, views::UNEXPECTED_PROBLEM).await?;
                Ok(RouteOutcome::Failed)
            }
        }
    }

    async fn rewrite(
        &self,
        user_id: i64,
        chat_id: i64,
        action: TextAction,
        text: &str,
        lang: &str,
    ) -> DeliveryOutcome {
        self.indicate(chat_id, ChatAction::Typing).await;
        let reply = match self
            .text_model
            .generate_from_instruction(&action.prompt(text))
            .await
        {
            Ok(reply) => Some(self.translator.from_english(&reply, lang).await),
            Err(e) => {
                error!(user_id, ?action, "Text model failed: {e}");
                None
            }
        };
        self.delivery
            .deliver(user_id, chat_id, reply.as_deref(), lang)
            .await
    }

    async fn notify(&self, chat_id: i64, text: &str) -> Result<(), TransportError> {
        self.transport
            .send_text(chat_id, text, TextFormat::Plain, None)
            .await
            .map(|_| ())
    }

    async fn indicate(&self, chat_id: i64, action: ChatAction) {
        if let Err(e) = self.transport.send_chat_action(chat_id, action).await {
            debug!("Chat action not shown: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::transport::{MessageRef, MockChatTransport};
    use crate::llm::MockLlmProvider;
    use crate::providers::speech::MockSpeechSynthesizer;
    use crate::providers::translate::MockTranslator;
    use crate::storage::InMemoryResponseStore;
    use mockall::predicate::eq;

    fn ok_ref(chat_id: i64) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: 7,
        }
    }

    fn router(
        store: Arc<dyn ResponseStore>,
        transport: MockChatTransport,
        text_model: MockLlmProvider,
        translator: MockTranslator,
        speech: MockSpeechSynthesizer,
    ) -> CallbackRouter {
        let transport: Arc<dyn ChatTransport> = Arc::new(transport);
        let delivery = Arc::new(DeliveryPipeline::new(store.clone(), transport.clone(), 3000));
        CallbackRouter::new(
            store,
            Arc::new(text_model),
            Arc::new(translator),
            Arc::new(speech),
            transport,
            delivery,
        )
    }

    #[tokio::test]
    async fn test_unknown_id_replies_not_found_without_synthesis() -> Result<(), TransportError> {
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .withf(|chat, text, _, kb| {
                *chat == 5 && text == "Could not find response for data_id 123" && kb.is_none()
            })
            .times(1)
            .returning(|chat, _, _, _| Ok(ok_ref(chat)));
        let mut speech = MockSpeechSynthesizer::new();
        speech.expect_synthesize().never();

        let router = router(
            Arc::new(InMemoryResponseStore::new(20)),
            transport,
            MockLlmProvider::new(),
            MockTranslator::new(),
            speech,
        );

        assert_eq!(router.route(1, 5, "tts_123").await?, RouteOutcome::NotFound);
        Ok(())
    }

    #[tokio::test]
    async fn test_bogus_payload_gets_generic_reply() -> Result<(), TransportError> {
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .with(eq(5), eq(views::USER_INFO_UNAVAILABLE), eq(TextFormat::Plain), eq(None))
            .times(1)
            .returning(|chat, _, _, _| Ok(ok_ref(chat)));

        let router = router(
            Arc::new(InMemoryResponseStore::new(20)),
            transport,
            MockLlmProvider::new(),
            MockTranslator::new(),
            MockSpeechSynthesizer::new(),
        );

        assert_eq!(router.route(1, 5, "bogus").await?, RouteOutcome::Malformed);
        Ok(())
    }

    #[tokio::test]
    async fn test_summarize_uses_template_and_stored_language() -> Result<(), TransportError> {
        let store = Arc::new(InMemoryResponseStore::new(20));
        let id = store
            .put(1, "texto largo".into(), "es".into())
            .await
            .map_err(|e| TransportError::Other(e.to_string()))?;

        let mut transport = MockChatTransport::new();
        transport.expect_send_chat_action().returning(|_, _| Ok(()));
        transport
            .expect_send_text()
            .withf(|_, text, _, kb| text == "resumen" && kb.is_some())
            .times(1)
            .returning(|chat, _, _, _| Ok(ok_ref(chat)));

        let mut model = MockLlmProvider::new();
        model
            .expect_generate_from_instruction()
            .withf(|prompt| prompt.starts_with("summarize this") && prompt.ends_with("texto largo"))
            .times(1)
            .returning(|_| Ok("summary".into()));
        let mut translator = MockTranslator::new();
        translator
            .expect_from_english()
            .with(eq("summary"), eq("es"))
            .times(1)
            .returning(|_, _| "resumen".into());

        let router = router(
            store.clone(),
            transport,
            model,
            translator,
            MockSpeechSynthesizer::new(),
        );

        let outcome = router.route(1, 5, &format!("summarize_{id}")).await?;
        let RouteOutcome::Rewritten(delivery) = outcome else {
            return Err(TransportError::Other(format!("unexpected outcome {outcome:?}")));
        };
        assert_eq!(store.count(1).await, 2);
        let latest = store.get_latest(1).await.ok().flatten();
        assert_eq!(
            latest.map(|e| (e.response_id, e.lang)),
            delivery.response_id.map(|id| (id, "es".to_string()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_rewrite_command_without_history_reports_nothing() -> Result<(), TransportError> {
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .with(eq(5), eq(views::NOTHING_TO_REWRITE), eq(TextFormat::Plain), eq(None))
            .times(1)
            .returning(|chat, _, _, _| Ok(ok_ref(chat)));

        let router = router(
            Arc::new(InMemoryResponseStore::new(20)),
            transport,
            MockLlmProvider::new(),
            MockTranslator::new(),
            MockSpeechSynthesizer::new(),
        );

        let outcome = router
            .rewrite_command(1, 5, TextAction::Elaborate, None)
            .await?;
        assert_eq!(outcome, RouteOutcome::NotFound);
        Ok(())
    }
}
