//! File-backed chat storage: one JSON document per chat

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tern_agent::{Chat, ChatStore, Error};
use tokio::fs;

/// Stores chats as `<dir>/<user>/<chat id>.json`
pub struct FileChatStore {
    dir: PathBuf,
}

impl FileChatStore {
    /// Get the default chats directory
    pub fn chats_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tern")
            .join("chats")
    }

    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn user_dir(&self, user_id: &str) -> PathBuf {
        self.dir.join(sanitize(user_id))
    }

    fn chat_path(&self, id: &str, user_id: &str) -> PathBuf {
        self.user_dir(user_id).join(format!("{}.json", sanitize(id)))
    }

    async fn read_chat(path: &Path) -> tern_agent::Result<Chat> {
        let content = fs::read_to_string(path).await.map_err(persistence)?;
        serde_json::from_str(&content).map_err(persistence)
    }
}

impl Default for FileChatStore {
    fn default() -> Self {
        Self::new(Self::chats_dir())
    }
}

#[async_trait]
impl ChatStore for FileChatStore {
    async fn save_chat(&self, chat: &Chat) -> tern_agent::Result<()> {
        let dir = self.user_dir(&chat.user_id);
        fs::create_dir_all(&dir).await.map_err(persistence)?;
        let content = serde_json::to_string_pretty(chat).map_err(persistence)?;
        fs::write(self.chat_path(&chat.id, &chat.user_id), content)
            .await
            .map_err(persistence)
    }

    async fn load_chat(&self, id: &str, user_id: &str) -> tern_agent::Result<Option<Chat>> {
        let path = self.chat_path(id, user_id);
        if !path.exists() {
            return Ok(None);
        }
        let chat = Self::read_chat(&path).await?;
        if chat.user_id != user_id {
            return Ok(None);
        }
        Ok(Some(chat))
    }

    async fn list_chats(&self, user_id: &str) -> tern_agent::Result<Vec<Chat>> {
        let dir = self.user_dir(user_id);
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut chats = Vec::new();
        let mut entries = fs::read_dir(&dir).await.map_err(persistence)?;
        while let Some(entry) = entries.next_entry().await.map_err(persistence)? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            match Self::read_chat(&path).await {
                Ok(chat) => chats.push(chat),
                Err(e) => tracing::warn!(path = %path.display(), "Skipping unreadable chat: {}", e),
            }
        }

        // Newest first
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(chats)
    }
}

fn persistence(e: impl std::fmt::Display) -> Error {
    Error::Persistence(e.to_string())
}

/// Keep ids usable as file names
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tern_agent::{ConversationState, Message};

    fn chat(id: &str, user: &str, first: &str, age_minutes: i64) -> Chat {
        let mut state = ConversationState::with_id(id);
        state.messages.push(Message::user(first));
        Chat::from_state(&state, user, Utc::now() - Duration::minutes(age_minutes))
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileChatStore::new(dir.path());
        let saved = chat("c1", "u1", "Flights to Lisbon", 0);
        store.save_chat(&saved).await.unwrap();

        let loaded = store.load_chat("c1", "u1").await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert!(store.load_chat("c1", "u2").await.unwrap().is_none());
        assert!(store.load_chat("missing", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileChatStore::new(dir.path());
        store.save_chat(&chat("old", "u1", "old trip", 60)).await.unwrap();
        store.save_chat(&chat("new", "u1", "new trip", 1)).await.unwrap();
        store.save_chat(&chat("theirs", "u2", "not mine", 0)).await.unwrap();
        std::fs::write(dir.path().join("u1").join("junk.json"), "{").unwrap();

        let chats = store.list_chats("u1").await.unwrap();
        let ids: Vec<&str> = chats.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "old"]);
        assert!(store.list_chats("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_overwrites() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileChatStore::new(dir.path());
        let mut saved = chat("c1", "u1", "hello", 0);
        store.save_chat(&saved).await.unwrap();
        saved.messages.push(Message::assistant("hi"));
        store.save_chat(&saved).await.unwrap();

        let loaded = store.load_chat("c1", "u1").await.unwrap().unwrap();
        assert_eq!(loaded.messages.len(), 2);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize("a-b_c9"), "a-b_c9");
    }
}
