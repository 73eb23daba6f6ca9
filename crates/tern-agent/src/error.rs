//! Error types for tern-agent

use thiserror::Error;

/// Result type alias using tern-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can end a completion attempt or a turn
#[derive(Error, Debug)]
pub enum Error {
    /// Tool arguments failed schema validation or could not be bound
    #[error("Invalid arguments for tool '{tool_name}': {message}")]
    Validation {
        tool_name: String,
        arguments: serde_json::Value,
        message: String,
    },

    /// The model named a tool that is not registered
    #[error("No tool '{name}' found.")]
    UnknownTool {
        name: String,
        arguments: serde_json::Value,
    },

    /// The completion stream reported an error
    #[error("Completion failed: {0}")]
    Completion(String),

    /// The completion service could not be reached
    #[error(transparent)]
    Service(#[from] tern_ai::Error),

    /// The completion stream produced an event kind this crate does not handle
    #[error("Unrecognized stream event: {kind}")]
    UnrecognizedEvent { kind: String },

    /// A state update tried to drop or reorder committed messages
    #[error("History rewrite rejected: {0}")]
    HistoryRewrite(String),

    /// An attachment could not be decoded
    #[error("Invalid attachment: {0}")]
    Attachment(String),

    /// The persistence collaborator failed
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// A producer went away without terminating its channel
    #[error("Turn ended without closing its output")]
    Abandoned,

    /// The session no longer accepts turns
    #[error("Session is shut down")]
    Closed,
}

impl Error {
    /// Create a validation error for a tool invocation
    pub fn validation(
        tool_name: impl Into<String>,
        arguments: serde_json::Value,
        message: impl Into<String>,
    ) -> Self {
        Self::Validation {
            tool_name: tool_name.into(),
            arguments,
            message: message.into(),
        }
    }

    /// Taxonomy label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "validation",
            Error::UnknownTool { .. } => "unknown_tool",
            Error::Completion(_) | Error::Service(_) => "transport",
            Error::UnrecognizedEvent { .. } => "protocol",
            Error::HistoryRewrite(_) => "history",
            Error::Attachment(_) => "attachment",
            Error::Persistence(_) => "persistence",
            Error::Abandoned => "abandoned",
            Error::Closed => "closed",
        }
    }

    /// The tool invocation that caused this error, if any
    pub fn failed_tool(&self) -> Option<(&str, &serde_json::Value)> {
        match self {
            Error::Validation {
                tool_name,
                arguments,
                ..
            } => Some((tool_name.as_str(), arguments)),
            Error::UnknownTool { name, arguments } => Some((name.as_str(), arguments)),
            _ => None,
        }
    }
}
