//! Outbound text replies: store, split, format and send.

use crate::bot::transport::{ActionKeyboard, ChatTransport, TextFormat, TransportError};
use crate::bot::views;
use crate::config::TELEGRAM_TEXT_LIMIT;
use crate::providers::translate::ENGLISH;
use crate::storage::ResponseStore;
use crate::utils::{fix_markdown_links, format_text, split_into_chunks};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Result of one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    /// Identifier the reply was stored under; `None` if storing failed
    pub response_id: Option<i64>,
    /// Chunks that reached the chat
    pub chunks_sent: usize,
    /// Chunks the text was split into
    pub chunks_total: usize,
}

/// Sends bot replies and keeps them available to the action buttons
pub struct DeliveryPipeline {
    store: Arc<dyn ResponseStore>,
    transport: Arc<dyn ChatTransport>,
    max_message_length: usize,
}

impl DeliveryPipeline {
    /// Pipeline splitting replies at `max_message_length` characters
    #[must_use]
    pub fn new(
        store: Arc<dyn ResponseStore>,
        transport: Arc<dyn ChatTransport>,
        max_message_length: usize,
    ) -> Self {
        Self {
            store,
            transport,
            max_message_length,
        }
    }

    /// Stores `text` for `user_id` and sends it to `chat_id`.
    ///
    /// Absent or blank text is replaced by the fixed problem notice. Chunks
    /// holding only whitespace are not sent, and the last chunk that is sent
    /// carries the action keyboard. A chunk whose markup is rejected, or
    /// whose formatted form no longer fits one message, goes out as plain
    /// text. Any other send failure ends the delivery with a single plain
    /// "no response" notice.
    pub async fn deliver(
        &self,
        user_id: i64,
        chat_id: i64,
        text: Option<&str>,
        lang: &str,
    ) -> DeliveryOutcome {
        let (text, lang) = match text {
            Some(t) if !t.trim().is_empty() => (t, lang),
            _ => {
                warn!(user_id, "Empty reply, sending problem notice instead");
                (views::UNEXPECTED_PROBLEM, ENGLISH)
            }
        };

        let response_id = match self
            .store
            .put(user_id, text.to_string(), lang.to_string())
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                error!(user_id, "Failed to store response, sending without buttons: {e}");
                None
            }
        };

        let chunks: Vec<String> = split_into_chunks(text, self.max_message_length)
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .collect();
        let chunks_total = chunks.len();
        let mut chunks_sent = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            let keyboard = response_id
                .filter(|_| index + 1 == chunks_total)
                .map(|response_id| ActionKeyboard { response_id });

            if let Err(e) = self.send_chunk(chat_id, chunk, keyboard).await {
                error!(user_id, chat_id, "Failed to deliver chunk {}/{chunks_total}: {e}", index + 1);
                if let Err(e) = self
                    .transport
                    .send_text(chat_id, views::NO_RESPONSE, TextFormat::Plain, None)
                    .await
                {
                    error!(chat_id, "Failed to send fallback notice: {e}");
                }
                break;
            }
            chunks_sent += 1;
        }

        debug!(user_id, ?response_id, chunks_sent, chunks_total, "Reply delivered");
        DeliveryOutcome {
            response_id,
            chunks_sent,
            chunks_total,
        }
    }

    async fn send_chunk(
        &self,
        chat_id: i64,
        chunk: &str,
        keyboard: Option<ActionKeyboard>,
    ) -> Result<(), TransportError> {
        let chunk = fix_markdown_links(chunk);
        let rich = format_text(&chunk);
        if rich.is_empty() || rich.chars().count() > TELEGRAM_TEXT_LIMIT {
            debug!(chat_id, "Formatted chunk unusable, sending as plain text");
            return self
                .transport
                .send_text(chat_id, &chunk, TextFormat::Plain, keyboard)
                .await
                .map(|_| ());
        }
        match self
            .transport
            .send_text(chat_id, &rich, TextFormat::Html, keyboard)
            .await
        {
            Ok(_) => Ok(()),
            Err(TransportError::FormattingRejected(reason)) => {
                warn!(chat_id, "Markup rejected ({reason}), resending as plain text");
                self.transport
                    .send_text(chat_id, &chunk, TextFormat::Plain, keyboard)
                    .await
                    .map(|_| ())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::transport::{MessageRef, MockChatTransport};
    use crate::storage::{InMemoryResponseStore, MockResponseStore, StorageError};
    use std::sync::Mutex;

    type Sent = Arc<Mutex<Vec<(String, TextFormat, Option<ActionKeyboard>)>>>;

    fn recording_transport(sent: &Sent) -> MockChatTransport {
        let sent = sent.clone();
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .returning(move |chat_id, text, format, keyboard| {
                if let Ok(mut log) = sent.lock() {
                    log.push((text.to_string(), format, keyboard));
                }
                Ok(MessageRef {
                    chat_id,
                    message_id: 1,
                })
            });
        transport
    }

    fn sent_log(sent: &Sent) -> Vec<(String, TextFormat, Option<ActionKeyboard>)> {
        sent.lock().map(|log| log.clone()).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_keyboard_only_on_last_chunk() {
        let sent = Sent::default();
        let store = Arc::new(InMemoryResponseStore::new(20));
        let pipeline = DeliveryPipeline::new(store.clone(), Arc::new(recording_transport(&sent)), 10);

        let outcome = pipeline.deliver(1, 100, Some(&"a".repeat(25)), "en").await;

        assert_eq!(outcome.chunks_total, 3);
        assert_eq!(outcome.chunks_sent, 3);
        let log = sent_log(&sent);
        assert_eq!(log.len(), 3);
        assert!(log[..2].iter().all(|(_, _, kb)| kb.is_none()));
        assert_eq!(
            log[2].2,
            outcome.response_id.map(|response_id| ActionKeyboard { response_id })
        );
        assert!(log[2].2.is_some());
        assert_eq!(store.count(1).await, 1);
    }

    #[tokio::test]
    async fn test_empty_text_becomes_problem_notice() {
        let sent = Sent::default();
        let store = Arc::new(InMemoryResponseStore::new(20));
        let pipeline =
            DeliveryPipeline::new(store.clone(), Arc::new(recording_transport(&sent)), 3000);

        let outcome = pipeline.deliver(1, 100, Some("   "), "es").await;

        let log = sent_log(&sent);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].0, views::UNEXPECTED_PROBLEM);
        let entry = store.get_latest(1).await.ok().flatten();
        assert_eq!(entry.map(|e| e.lang), Some("en".to_string()));
        assert!(outcome.response_id.is_some());
    }

    #[tokio::test]
    async fn test_rejected_markup_falls_back_to_plain_with_same_keyboard() {
        let sent = Sent::default();
        let log = sent.clone();
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .returning(move |chat_id, text, format, keyboard| {
                if let Ok(mut l) = log.lock() {
                    l.push((text.to_string(), format, keyboard));
                }
                if format == TextFormat::Html {
                    Err(TransportError::FormattingRejected("bad entity".into()))
                } else {
                    Ok(MessageRef {
                        chat_id,
                        message_id: 2,
                    })
                }
            });
        let pipeline = DeliveryPipeline::new(
            Arc::new(InMemoryResponseStore::new(20)),
            Arc::new(transport),
            3000,
        );

        let outcome = pipeline.deliver(1, 100, Some("see [docs] (http://x)"), "en").await;

        let log = sent_log(&sent);
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].0, "see [docs](http://x)");
        assert_eq!(log[1].1, TextFormat::Plain);
        assert_eq!(log[0].2, log[1].2);
        assert_eq!(outcome.chunks_sent, 1);
    }

    #[tokio::test]
    async fn test_persistent_failure_sends_one_notice() {
        let sent = Sent::default();
        let log = sent.clone();
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .returning(move |chat_id, text, format, keyboard| {
                if let Ok(mut l) = log.lock() {
                    l.push((text.to_string(), format, keyboard));
                }
                if text == views::NO_RESPONSE {
                    Ok(MessageRef {
                        chat_id,
                        message_id: 3,
                    })
                } else {
                    Err(TransportError::Other("network down".into()))
                }
            });
        let pipeline = DeliveryPipeline::new(
            Arc::new(InMemoryResponseStore::new(20)),
            Arc::new(transport),
            5,
        );

        let outcome = pipeline.deliver(1, 100, Some("0123456789"), "en").await;

        assert_eq!(outcome.chunks_sent, 0);
        let log = sent_log(&sent);
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].0, views::NO_RESPONSE);
    }

    /// Rejects what Telegram rejects: blank text and text over the limit
    fn strict_transport(sent: &Sent) -> MockChatTransport {
        let sent = sent.clone();
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_text()
            .returning(move |chat_id, text, format, keyboard| {
                if let Ok(mut log) = sent.lock() {
                    log.push((text.to_string(), format, keyboard));
                }
                if text.trim().is_empty() || text.chars().count() > TELEGRAM_TEXT_LIMIT {
                    return Err(TransportError::FormattingRejected("bad request".into()));
                }
                Ok(MessageRef {
                    chat_id,
                    message_id: 4,
                })
            });
        transport
    }

    #[tokio::test]
    async fn test_escaping_overflow_sends_plain_chunks() {
        let sent = Sent::default();
        let pipeline = DeliveryPipeline::new(
            Arc::new(InMemoryResponseStore::new(20)),
            Arc::new(strict_transport(&sent)),
            3000,
        );
        let text = format!("Here is some HTML: {}", "<li>".repeat(800));

        let outcome = pipeline.deliver(1, 100, Some(&text), "en").await;

        assert_eq!(outcome.chunks_total, 2);
        assert_eq!(outcome.chunks_sent, 2);
        let log = sent_log(&sent);
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].1, TextFormat::Plain);
        assert_eq!(log[0].0, text.chars().take(3000).collect::<String>());
        assert!(log[0].2.is_none());
        assert_eq!(log[1].1, TextFormat::Html);
        assert!(log[1].2.is_some());
        assert!(log.iter().all(|(t, _, _)| t != views::NO_RESPONSE));
    }

    #[tokio::test]
    async fn test_whitespace_tail_chunk_is_skipped_and_keyboard_kept() {
        let sent = Sent::default();
        let pipeline = DeliveryPipeline::new(
            Arc::new(InMemoryResponseStore::new(20)),
            Arc::new(strict_transport(&sent)),
            3000,
        );
        let text = format!("{}\n\n", "a".repeat(3000));

        let outcome = pipeline.deliver(1, 100, Some(&text), "en").await;

        assert_eq!(outcome.chunks_total, 1);
        assert_eq!(outcome.chunks_sent, 1);
        let log = sent_log(&sent);
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].1, TextFormat::Html);
        assert_eq!(
            log[0].2,
            outcome.response_id.map(|response_id| ActionKeyboard { response_id })
        );
        assert!(log[0].2.is_some());
    }

    #[tokio::test]
    async fn test_store_failure_still_sends_without_buttons() {
        let sent = Sent::default();
        let mut store = MockResponseStore::new();
        store
            .expect_put()
            .returning(|_, _, _| Err(StorageError::S3Put("r2 down".into())));
        let pipeline =
            DeliveryPipeline::new(Arc::new(store), Arc::new(recording_transport(&sent)), 3000);

        let outcome = pipeline.deliver(1, 100, Some("hello"), "en").await;

        assert_eq!(outcome.response_id, None);
        let log = sent_log(&sent);
        assert_eq!(log.len(), 1);
        assert!(log[0].2.is_none());
    }
}
