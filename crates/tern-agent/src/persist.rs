//! Persistence and identity collaborators.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{ConversationState, Message};

/// Longest title derived from the first message
const TITLE_CHARS: usize = 100;

/// The authenticated user a session acts for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// A persisted conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub interactions: Vec<String>,
    pub path: String,
}

impl Chat {
    pub fn from_state(state: &ConversationState, user_id: &str, created_at: DateTime<Utc>) -> Self {
        let title = state
            .messages
            .first()
            .map(|m| m.text().chars().take(TITLE_CHARS).collect())
            .unwrap_or_default();
        Self {
            id: state.conversation_id.clone(),
            title,
            user_id: user_id.to_string(),
            created_at,
            messages: state.messages.clone(),
            interactions: state.interactions.clone(),
            path: format!("/chat/{}", state.conversation_id),
        }
    }

    pub fn into_state(self) -> ConversationState {
        ConversationState {
            conversation_id: self.id,
            messages: self.messages,
            interactions: self.interactions,
        }
    }
}

/// Storage for finished conversations
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn save_chat(&self, chat: &Chat) -> Result<()>;

    /// Load a chat owned by `user_id`
    async fn load_chat(&self, id: &str, user_id: &str) -> Result<Option<Chat>>;

    /// Chats owned by `user_id`, newest first
    async fn list_chats(&self, user_id: &str) -> Result<Vec<Chat>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_is_truncated_first_message() {
        let mut state = ConversationState::with_id("abc");
        state.messages.push(Message::user("x".repeat(150)));
        state.messages.push(Message::assistant("reply"));

        let chat = Chat::from_state(&state, "u1", Utc::now());
        assert_eq!(chat.title.chars().count(), 100);
        assert_eq!(chat.path, "/chat/abc");
        assert_eq!(chat.user_id, "u1");

        let restored = chat.into_state();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_empty_chat_has_empty_title() {
        let chat = Chat::from_state(&ConversationState::with_id("e"), "u1", Utc::now());
        assert!(chat.title.is_empty());
    }
}
