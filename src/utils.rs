//! Utility functions for text processing, HTML cleaning, message chunking and retries.
//!
//! Regex patterns are declared with the `lazy-regex` crate so they are
//! validated at compile time and built on first use.

// lazy_regex! uses once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use anyhow::Result;
use lazy_regex::lazy_regex;
use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff, FixedInterval};
use tokio_retry::{Retry, RetryIf};
use tracing::warn;
use uuid::Uuid;

/// Match code spans left unescaped by `clean_html`: ```...``` blocks and single-line `...`
static RE_CODE_BLOCK: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"```[\s\S]*?```|`[^`\n]*`");

/// Match code blocks with optional language: ```language\ncode```
static RE_CODE_BLOCK_FENCE: lazy_regex::Lazy<regex::Regex> =
    lazy_regex!(r"```(\w+)?\n([\s\S]*?)```");

/// Match bullet points at start of line: *
static RE_BULLET: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"(?m)^\* ");

/// Match bold text: **text**
static RE_BOLD: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\*\*(.*?)\*\*");

/// Match italic text: *text*
static RE_ITALIC: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\*(.*?)\*");

/// Match inline code: `code`
static RE_INLINE_CODE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"`(.*?)`");

/// Match 3+ consecutive newlines
static RE_MULTI_NEWLINE: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\n{3,}");

/// Match a markdown link whose label and target are separated by a space: `] (`
static RE_SPACED_LINK: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\] \(");

/// Replace naked angle brackets with HTML entities, preserving Telegram-allowed HTML tags.
fn escape_angle_brackets(text: &str) -> String {
    // Whitelist of HTML tags supported by Telegram
    const TELEGRAM_ALLOWED_TAGS: &[&str] = &[
        "b", "i", "u", "s", "code", "pre", "a", "/b", "/i", "/u", "/s", "/code", "/pre", "/a",
    ];

    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut in_tag = false;

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let mut lookahead = String::new();

                if let Some(slash) = chars.next_if_eq(&'/') {
                    lookahead.push(slash);
                }
                while let Some(next_char) = chars.next_if(char::is_ascii_alphanumeric) {
                    lookahead.push(next_char);
                }

                if TELEGRAM_ALLOWED_TAGS.contains(&lookahead.as_str()) {
                    result.push('<');
                    result.push_str(&lookahead);
                    in_tag = true;
                } else {
                    result.push_str("&lt;");
                    result.push_str(&lookahead);
                }
            }
            '>' if in_tag => {
                result.push(c);
                in_tag = false;
            }
            '>' => result.push_str("&gt;"),
            _ => result.push(c),
        }
    }
    result
}

/// Cleans HTML content by escaping naked angle brackets while preserving code blocks, inline code and valid HTML tags.
///
/// # Examples
///
/// ```
/// use sakura_bot::utils::clean_html;
/// let input = "Check this: 1 < 2 but <b>bold</b> works";
/// let cleaned = clean_html(input);
/// assert_eq!(cleaned, "Check this: 1 &lt; 2 but <b>bold</b> works");
/// ```
#[must_use]
pub fn clean_html(text: &str) -> String {
    // UUID placeholders so user text containing "__CODE_BLOCK_0__" is left alone
    let mut code_blocks: Vec<(String, String)> = Vec::new();

    let mut result = String::new();
    let mut last_end = 0;
    for mat in RE_CODE_BLOCK.find_iter(text) {
        result.push_str(&text[last_end..mat.start()]);
        let uuid = Uuid::new_v4().as_simple().to_string();
        let placeholder = format!("__CODE_BLOCK_{uuid}__");
        code_blocks.push((placeholder.clone(), mat.as_str().to_string()));
        result.push_str(&placeholder);
        last_end = mat.end();
    }
    result.push_str(&text[last_end..]);

    let mut text_owned = escape_angle_brackets(&result);

    for (placeholder, block) in code_blocks {
        text_owned = text_owned.replace(&placeholder, &block);
    }

    text_owned
}

/// Formats markdown-like text into Telegram-compatible HTML.
///
/// Supported formatting:
/// - Code blocks: ` ```language\ncode``` ` -> `<pre><code class="language">code</code></pre>`
/// - Bullets: `* ` at the start of a line -> `• `
/// - Bold: `**text**` -> `<b>text</b>`
/// - Italic: `*text*` -> `<i>text</i>`
/// - Inline code: `` `code` `` -> `<code>code</code>`
/// - Multiple newlines (3+) are collapsed into two.
///
/// # Examples
///
/// ```
/// use sakura_bot::utils::format_text;
/// let input = "**Bold** and *italic* with `code`";
/// let formatted = format_text(input);
/// assert_eq!(formatted, "<b>Bold</b> and <i>italic</i> with <code>code</code>");
/// ```
#[must_use]
pub fn format_text(text: &str) -> String {
    let mut text_owned = clean_html(text);

    text_owned = RE_CODE_BLOCK_FENCE
        .replace_all(&text_owned, |caps: &regex::Captures| {
            let lang = caps.get(1).map_or("", |m| m.as_str());
            let code = caps.get(2).map_or("", |m| m.as_str()).trim();
            let escaped_code = html_escape::encode_text(code);
            format!("<pre><code class=\"{lang}\">{escaped_code}</code></pre>")
        })
        .to_string();

    text_owned = RE_BULLET.replace_all(&text_owned, "• ").to_string();
    text_owned = RE_BOLD.replace_all(&text_owned, "<b>$1</b>").to_string();
    text_owned = RE_ITALIC.replace_all(&text_owned, "<i>$1</i>").to_string();

    text_owned = RE_INLINE_CODE
        .replace_all(&text_owned, |caps: &regex::Captures| {
            let code = caps.get(1).map_or("", |m| m.as_str());
            let escaped_code = html_escape::encode_text(code);
            format!("<code>{escaped_code}</code>")
        })
        .to_string();

    text_owned = RE_MULTI_NEWLINE
        .replace_all(&text_owned, "\n\n")
        .to_string();

    text_owned.trim().to_string()
}

/// Joins `label] (target)` into `label](target)` so models' spaced links render.
#[must_use]
pub fn fix_markdown_links(text: &str) -> String {
    RE_SPACED_LINK.replace_all(text, "](").to_string()
}

/// Cuts `text` into contiguous pieces of at most `max_chars` characters.
///
/// Cuts are made purely on length, never on words or lines, and always on a
/// character boundary. Concatenating the result yields `text` again.
///
/// # Examples
///
/// ```
/// use sakura_bot::utils::split_into_chunks;
/// let parts = split_into_chunks("abcdefg", 3);
/// assert_eq!(parts, vec!["abc", "def", "g"]);
/// ```
#[must_use]
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut count = 0;

    for c in text.chars() {
        if count == max_chars {
            parts.push(std::mem::take(&mut current));
            count = 0;
        }
        current.push(c);
        count += 1;
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Safely truncates a string to a maximum character length (not bytes).
/// This is UTF-8 safe and will not panic on multi-byte characters.
pub fn truncate_str(s: impl AsRef<str>, max_chars: usize) -> String {
    let s = s.as_ref();
    s.char_indices()
        .nth(max_chars)
        .map_or_else(|| s.to_string(), |(pos, _)| s[..pos].to_string())
}

/// Retries a Telegram API operation with exponential backoff and jitter.
///
/// `should_retry` decides whether a failure is transient; permanent failures
/// are returned immediately.
///
/// # Errors
///
/// Returns the last error once every attempt has failed.
///
/// # Examples
///
/// ```no_run
/// use sakura_bot::utils::retry_telegram_operation;
/// use anyhow::Result;
///
/// async fn download_file() -> Result<Vec<u8>> {
///     Ok(vec![])
/// }
///
/// # async fn example() -> Result<()> {
/// let buffer = retry_telegram_operation(|| async {
///     download_file().await
/// }, |_| true).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_telegram_operation<F, Fut, T, E, P>(operation: F, should_retry: P) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: FnMut(&E) -> bool,
{
    use crate::config::{
        TELEGRAM_API_INITIAL_BACKOFF_MS, TELEGRAM_API_MAX_BACKOFF_MS, TELEGRAM_API_MAX_RETRIES,
    };

    let retry_strategy = ExponentialBackoff::from_millis(TELEGRAM_API_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(TELEGRAM_API_MAX_BACKOFF_MS))
        .map(jitter)
        .take(TELEGRAM_API_MAX_RETRIES);

    RetryIf::spawn(retry_strategy, operation, should_retry)
        .await
        .map_err(|e| {
            warn!("Telegram API operation failed: {e}");
            e
        })
}

/// Runs a collaborator call and retries it once after a short pause.
///
/// # Errors
///
/// Returns the error of the second attempt.
pub async fn retry_once<F, Fut, T, E>(label: &str, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    use crate::config::COLLABORATOR_RETRY_DELAY_MS;

    let strategy = FixedInterval::from_millis(COLLABORATOR_RETRY_DELAY_MS).take(1);
    Retry::spawn(strategy, operation).await.map_err(|e| {
        warn!("{label} failed after retry: {e}");
        e
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_truncate_str_unicode() {
        let s = "Привет, мир!";
        assert_eq!(truncate_str(s, 6), "Привет");
        assert_eq!(truncate_str(s, 50), "Привет, мир!");
    }

    #[test]
    fn test_clean_html_preserves_code_blocks() {
        let input = "Start\n```rust\nfn main() {\n    println!(\"<hello>\");\n}\n```\nEnd < 3";
        let expected =
            "Start\n```rust\nfn main() {\n    println!(\"<hello>\");\n}\n```\nEnd &lt; 3";
        assert_eq!(clean_html(input), expected);
    }

    #[test]
    fn test_clean_html_escapes_unsupported_tags() {
        let input = "Text with <custom>tag</custom> and <b>bold</b>";
        let expected = "Text with &lt;custom&gt;tag&lt;/custom&gt; and <b>bold</b>";
        assert_eq!(clean_html(input), expected);
    }

    #[test]
    fn test_format_text_markdown() {
        let input = "* Bullet\nAnd **bold** text\nAnd *italic*\nAnd `inline code`";
        let expected =
            "• Bullet\nAnd <b>bold</b> text\nAnd <i>italic</i>\nAnd <code>inline code</code>";
        assert_eq!(format_text(input), expected);
    }

    #[test]
    fn test_format_text_escapes_inline_code_once() {
        assert_eq!(
            format_text("use `Vec<u8>` here, not a < b"),
            "use <code>Vec&lt;u8&gt;</code> here, not a &lt; b"
        );
    }

    #[test]
    fn test_format_text_code_blocks() {
        let input = "Code:\n```rust\nlet x = 1;\n```";
        let expected = "Code:\n<pre><code class=\"rust\">let x = 1;</code></pre>";
        assert_eq!(format_text(input), expected);
    }

    #[test]
    fn test_fix_markdown_links() {
        assert_eq!(
            fix_markdown_links("see [docs] (https://example.com)"),
            "see [docs](https://example.com)"
        );
    }

    #[test]
    fn test_split_into_chunks_exact_cuts() {
        let text = "a".repeat(7000);
        let parts = split_into_chunks(&text, 3000);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), 3000);
        assert_eq!(parts[2].len(), 1000);
    }

    #[test]
    fn test_split_into_chunks_counts_characters() {
        let text = "🌸".repeat(5);
        let parts = split_into_chunks(&text, 2);
        assert_eq!(parts, vec!["🌸🌸", "🌸🌸", "🌸"]);
    }

    #[test]
    fn test_split_into_chunks_empty() {
        assert!(split_into_chunks("", 10).is_empty());
    }

    proptest! {
        #[test]
        fn prop_chunk_count_is_ceiling(text in "\\PC{0,400}", max in 1usize..64) {
            let parts = split_into_chunks(&text, max);
            let len = text.chars().count();
            prop_assert_eq!(parts.len(), len.div_ceil(max));
            prop_assert!(parts.iter().all(|p| p.chars().count() <= max));
            prop_assert_eq!(parts.concat(), text);
        }
    }

    #[tokio::test]
    async fn test_retry_once_makes_two_attempts() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), String> = retry_once("test call", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("boom".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_once_returns_first_success() {
        let attempts = AtomicUsize::new(0);
        let result: Result<u8, String> = retry_once("test call", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_telegram_retry_skips_permanent_failures() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), String> = retry_telegram_operation(
            || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err("can't parse entities".to_string()) }
            },
            |e: &String| !e.contains("parse"),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
