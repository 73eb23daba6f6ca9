//! Conversation state store owned by one turn.
//!
//! The store only ever swaps whole snapshots. Every `update` must keep the
//! committed log as a prefix of the new log, so a turn can add messages but
//! never drop or rewrite them. After `done` the store is sealed and further
//! updates are ignored.

use crate::error::{Error, Result};
use crate::message::{ConversationState, Message};

/// Snapshot store for the conversation of the current turn
#[derive(Debug)]
pub struct StateStore {
    state: ConversationState,
    sealed: bool,
}

impl StateStore {
    /// Open a store on the latest committed snapshot
    pub fn new(state: ConversationState) -> Self {
        Self {
            state,
            sealed: false,
        }
    }

    /// Current snapshot
    pub fn get(&self) -> ConversationState {
        self.state.clone()
    }

    /// Borrow the current snapshot without cloning
    pub fn current(&self) -> &ConversationState {
        &self.state
    }

    /// Number of messages in the current log
    pub fn message_count(&self) -> usize {
        self.state.messages.len()
    }

    /// Replace the snapshot. `next` must be derived from the latest `get()`.
    pub fn update(&mut self, next: ConversationState) -> Result<()> {
        if self.sealed {
            tracing::debug!(
                conversation_id = %self.state.conversation_id,
                "Ignoring update on sealed conversation store"
            );
            return Ok(());
        }
        check_append_only(&self.state, &next)?;
        self.state = next;
        Ok(())
    }

    /// Append one message to the log
    pub fn append(&mut self, message: Message) -> Result<()> {
        let mut next = self.get();
        next.messages.push(message);
        self.update(next)
    }

    /// Seal the store, optionally committing a final snapshot first.
    pub fn done(&mut self, final_state: Option<ConversationState>) {
        if self.sealed {
            tracing::debug!(
                conversation_id = %self.state.conversation_id,
                "Conversation store already sealed"
            );
            return;
        }
        if let Some(next) = final_state {
            match check_append_only(&self.state, &next) {
                Ok(()) => self.state = next,
                Err(e) => tracing::warn!("Discarding final snapshot: {}", e),
            }
        }
        self.sealed = true;
    }

    /// Whether `done` has been called
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Consume the store, returning the last snapshot
    pub fn into_state(self) -> ConversationState {
        self.state
    }
}

fn check_append_only(current: &ConversationState, next: &ConversationState) -> Result<()> {
    if next.conversation_id != current.conversation_id {
        return Err(Error::HistoryRewrite(format!(
            "conversation id changed from {} to {}",
            current.conversation_id, next.conversation_id
        )));
    }
    if next.messages.len() < current.messages.len() {
        return Err(Error::HistoryRewrite(format!(
            "{} committed messages would be dropped",
            current.messages.len() - next.messages.len()
        )));
    }
    if let Some(changed) = current
        .messages
        .iter()
        .zip(&next.messages)
        .find(|(old, new)| old != new)
    {
        return Err(Error::HistoryRewrite(format!(
            "message {} would be replaced",
            changed.0.id
        )));
    }
    Ok(())
}
