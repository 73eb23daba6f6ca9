//! Streaming event types

use crate::types::{FinishReason, Usage};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted by a completion service, in the order it produced them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CompletionEvent {
    /// Text content delta
    TextDelta { delta: String },
    /// The model asked for a tool with fully parsed arguments
    ToolCall {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },
    /// Generation finished
    Finish { reason: FinishReason, usage: Usage },
    /// The service reported an error mid-stream
    Error { message: String },
    /// The service emitted something this crate does not understand
    Unrecognized { kind: String },
}

impl CompletionEvent {
    /// Check if this is a terminal event (Finish or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CompletionEvent::Finish { .. } | CompletionEvent::Error { .. }
        )
    }

    /// Short name of the event kind, for logging
    pub fn kind(&self) -> &str {
        match self {
            CompletionEvent::TextDelta { .. } => "text-delta",
            CompletionEvent::ToolCall { .. } => "tool-call",
            CompletionEvent::Finish { .. } => "finish",
            CompletionEvent::Error { .. } => "error",
            CompletionEvent::Unrecognized { kind } => kind,
        }
    }

    /// Convenience constructor for a text delta
    pub fn text(delta: impl Into<String>) -> Self {
        CompletionEvent::TextDelta {
            delta: delta.into(),
        }
    }

    /// Convenience constructor for a normal finish
    pub fn finish() -> Self {
        CompletionEvent::Finish {
            reason: FinishReason::Stop,
            usage: Usage::default(),
        }
    }
}

/// A stream of completion events
pub type CompletionEventStream = Pin<Box<dyn Stream<Item = CompletionEvent> + Send>>;
