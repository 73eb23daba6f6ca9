//! Conversation messages and the per-session conversation state.

use serde::{Deserialize, Serialize};
use tern_ai::{MessageContent, Role};

/// Tag recording which tool produced a message and the props needed to
/// render it again from history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Display {
    pub name: String,
    pub props: serde_json::Value,
}

/// A message in the conversation log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<Display>,
}

impl Message {
    /// Create a message with a fresh id
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            id: message_id(),
            role,
            content: content.into(),
            display: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a system message
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(Role::System, content)
    }

    /// Tag the message with the tool that produced it
    pub fn with_display(mut self, name: impl Into<String>, props: serde_json::Value) -> Self {
        self.display = Some(Display {
            name: name.into(),
            props,
        });
        self
    }

    /// Combined text content
    pub fn text(&self) -> String {
        self.content.text()
    }

    /// The message as sent to the completion service
    pub fn to_prompt(&self) -> tern_ai::Message {
        tern_ai::Message::new(self.role, self.content.clone())
    }
}

/// Short random message id
pub fn message_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

/// Conversation state: the ordered log plus pending interaction context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub conversation_id: String,
    pub messages: Vec<Message>,
    /// Context strings folded into the next user message, then cleared
    #[serde(default)]
    pub interactions: Vec<String>,
}

impl ConversationState {
    /// Start an empty conversation with a new id
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string())
    }

    /// Start an empty conversation with the given id
    pub fn with_id(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            messages: vec![],
            interactions: vec![],
        }
    }

    /// The log as prompt history, oldest first
    pub fn prompt_history(&self) -> Vec<tern_ai::Message> {
        self.messages.iter().map(Message::to_prompt).collect()
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_ids_are_unique() {
        let a = Message::user("hi");
        let b = Message::user("hi");
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 12);
    }

    #[test]
    fn test_display_round_trips_through_json() {
        let msg = Message::assistant("Here's a list of flights for you.")
            .with_display("showFlights", json!({ "summary": { "arrivalCity": "Paris" } }));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["display"]["name"], "showFlights");

        let plain = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(plain.get("display").is_none());
    }

    #[test]
    fn test_prompt_history_keeps_order_and_roles() {
        let mut state = ConversationState::with_id("c1");
        state.messages.push(Message::user("one"));
        state.messages.push(Message::assistant("two"));
        let history = state.prompt_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].text(), "two");
    }

    #[test]
    fn test_interactions_default_when_missing() {
        let state: ConversationState =
            serde_json::from_value(json!({ "conversation_id": "c", "messages": [] })).unwrap();
        assert!(state.interactions.is_empty());
    }
}
