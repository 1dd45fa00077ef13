//! Sakura: a Telegram assistant that answers in the user's language, keeps
//! its recent replies so inline buttons can speak or rewrite them, and walks
//! users through image generation.

#![deny(missing_docs)]

/// Temporary media files handed to the chat
pub mod artifact;
/// Telegram-facing logic
pub mod bot;
/// Configuration loading and constants
pub mod config;
/// Generative text backends
pub mod llm;
/// Translation, speech and image collaborators
pub mod providers;
/// Dispatcher wiring and restart loop
pub mod runner;
/// Response history persistence
pub mod storage;
/// Text helpers and retry utilities
pub mod utils;
