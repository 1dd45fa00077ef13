use std::collections::HashMap;
use tokio::sync::Mutex;

/// Sessions are scoped to one user in one chat
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SessionKey {
    /// Telegram user id
    pub user_id: i64,
    /// Telegram chat id
    pub chat_id: i64,
}

impl SessionKey {
    /// Key for `user_id` in `chat_id`
    #[must_use]
    pub const fn new(user_id: i64, chat_id: i64) -> Self {
        Self { user_id, chat_id }
    }
}

/// Progress through the image generation wizard
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No wizard running
    #[default]
    Idle,
    /// Waiting for the image prompt
    AwaitingPrompt,
    /// Waiting for the size choice
    AwaitingSize {
        /// Prompt entered by the user
        prompt: String,
    },
    /// Waiting for the style choice
    AwaitingStyle {
        /// Prompt entered by the user
        prompt: String,
        /// Size chosen by the user, verbatim
        size: String,
    },
    /// The image is being generated
    Processing {
        /// Prompt entered by the user
        prompt: String,
        /// Size chosen by the user, verbatim
        size: String,
        /// Style chosen by the user, verbatim
        style: String,
    },
}

impl SessionState {
    /// True when no wizard is running
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }
}

/// Owner of every live [`SessionState`]. Idle sessions are not stored.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<SessionKey, SessionState>>,
}

impl SessionRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state; `Idle` when nothing is stored
    pub async fn get(&self, key: SessionKey) -> SessionState {
        self.sessions
            .lock()
            .await
            .get(&key)
            .cloned()
            .unwrap_or_default()
    }

    /// Stores `state`, dropping the entry when it is `Idle`
    pub async fn set(&self, key: SessionKey, state: SessionState) {
        let mut sessions = self.sessions.lock().await;
        if state.is_idle() {
            sessions.remove(&key);
        } else {
            sessions.insert(key, state);
        }
    }

    /// Returns the session to `Idle`, reporting whether one was running
    pub async fn clear(&self, key: SessionKey) -> bool {
        self.sessions.lock().await.remove(&key).is_some()
    }

    #[cfg(test)]
    pub(crate) async fn active(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_idle_is_not_stored() {
        let registry = SessionRegistry::new();
        let key = SessionKey::new(1, 10);

        registry.set(key, SessionState::AwaitingPrompt).await;
        assert_eq!(registry.active().await, 1);

        registry.set(key, SessionState::Idle).await;
        assert_eq!(registry.active().await, 0);
        assert_eq!(registry.get(key).await, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_per_user_and_chat() {
        let registry = SessionRegistry::new();
        registry
            .set(SessionKey::new(1, 10), SessionState::AwaitingPrompt)
            .await;

        assert!(registry.get(SessionKey::new(2, 10)).await.is_idle());
        assert!(registry.get(SessionKey::new(1, 11)).await.is_idle());
        assert!(registry.clear(SessionKey::new(1, 10)).await);
        assert!(!registry.clear(SessionKey::new(1, 10)).await);
    }
}
