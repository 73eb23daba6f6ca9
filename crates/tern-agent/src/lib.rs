//! tern-agent: streaming conversation orchestrator
//!
//! This crate runs one conversational turn at a time against a completion
//! service, routing the streamed response into four output channels while
//! letting the model call typed tools that update the conversation.

pub mod attachment;
pub mod channel;
pub mod consumer;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod persist;
pub mod purchase;
pub mod retry;
pub mod session;
pub mod store;
pub mod tool;
pub mod ui;

#[cfg(test)]
mod testing;

pub use attachment::Attachment;
pub use channel::{ChannelEvent, ChannelHandles, ChannelReceiver, ChannelSet, OutputChannel};
pub use consumer::{FinishHook, StreamConsumer, TurnSummary};
pub use error::{Error, Result};
pub use message::{ConversationState, Display, Message};
pub use orchestrator::{
    ModelSettings, Orchestrator, PrepareHistory, RetryPolicy, TurnOutcome, TurnReport, settle,
    with_system_prompt,
};
pub use persist::{Chat, ChatStore, Identity};
pub use retry::RetryContext;
pub use session::{Session, SessionBuilder, TurnHandle};
pub use store::StateStore;
pub use tool::{Tool, ToolInvocation, ToolRegistry};
pub use ui::{Status, UiEntry, UiNode};
