//! Structured UI values pushed on output channels, and reconstruction of the
//! visible transcript from persisted history.

use serde::{Deserialize, Serialize};
use tern_ai::Role;

use crate::message::ConversationState;
use crate::purchase::{PURCHASE_COMPLETED, expired_tickets_card};
use crate::tool::ToolRegistry;

/// A structured UI tree. Clients decide how to draw each node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiNode {
    /// Nothing to show
    Empty,
    /// Indeterminate progress
    Spinner,
    /// Assistant text
    BotMessage { content: String },
    /// User text
    UserMessage { content: String },
    /// Out-of-band notice from the system
    SystemMessage { content: String },
    /// Assistant-side card wrapping a richer component
    BotCard { child: Box<UiNode> },
    /// Several nodes shown together
    Fragment { children: Vec<UiNode> },
    /// A named component with its props
    Component {
        name: String,
        props: serde_json::Value,
    },
}

impl UiNode {
    pub fn bot_message(content: impl Into<String>) -> Self {
        UiNode::BotMessage {
            content: content.into(),
        }
    }

    pub fn system_message(content: impl Into<String>) -> Self {
        UiNode::SystemMessage {
            content: content.into(),
        }
    }

    pub fn bot_card(child: UiNode) -> Self {
        UiNode::BotCard {
            child: Box::new(child),
        }
    }

    pub fn component(name: impl Into<String>, props: serde_json::Value) -> Self {
        UiNode::Component {
            name: name.into(),
            props,
        }
    }

    pub fn fragment(children: Vec<UiNode>) -> Self {
        UiNode::Fragment { children }
    }
}

/// Value type of the status channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Status {
    /// Waiting for the first event
    Thinking,
    /// Events are arriving
    Responding,
    /// The first attempt failed and a second one is running
    Retrying { notice: String },
    /// Waiting for the user to enter a confirmation code
    RequiresCode,
    /// Payment accepted, order being fulfilled
    InProgress,
    /// Order fulfilled
    Completed,
}

/// One visible row of a reconstructed transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UiEntry {
    pub id: String,
    pub display: UiNode,
}

/// Rebuild the visible transcript from a conversation log.
///
/// System messages are hidden. Assistant messages tagged by a registered tool
/// are rendered by that tool from the stored props, and a completed purchase
/// shows as an expired checkout card.
pub fn ui_state(state: &ConversationState, registry: &ToolRegistry) -> Vec<UiEntry> {
    state
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .enumerate()
        .map(|(index, message)| {
            let display = match message.role {
                Role::Assistant => message
                    .display
                    .as_ref()
                    .and_then(|d| registry.render(&d.name, &d.props))
                    .unwrap_or_else(|| {
                        let text = message.text();
                        if text == PURCHASE_COMPLETED {
                            expired_tickets_card()
                        } else {
                            UiNode::bot_message(text)
                        }
                    }),
                Role::User => UiNode::UserMessage {
                    content: message.text(),
                },
                Role::System => UiNode::bot_message(message.text()),
            };
            UiEntry {
                id: format!("{}-{}", state.conversation_id, index),
                display,
            }
        })
        .collect()
}
