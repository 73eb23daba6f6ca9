//! Stream consumer: routes completion events to the channels, the tool
//! registry and the state store, strictly in arrival order.

use std::sync::Arc;

use futures::StreamExt;
use tern_ai::{CompletionEvent, CompletionEventStream, FinishReason, Usage};

use crate::channel::ChannelSet;
use crate::error::{Error, Result};
use crate::message::Message;
use crate::store::StateStore;
use crate::tool::{ToolInvocation, ToolRegistry};
use crate::ui::{Status, UiNode};

/// Runs when the stream finishes, with the accumulated text of the attempt
pub type FinishHook = Arc<dyn Fn(&mut StateStore, &str) -> Result<()> + Send + Sync>;

/// Default finish hook: append non-empty text as an assistant message
pub fn append_assistant_text() -> FinishHook {
    Arc::new(|store: &mut StateStore, text: &str| {
        if text.is_empty() {
            return Ok(());
        }
        store.append(Message::assistant(text))
    })
}

/// What one successful attempt produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnSummary {
    pub text: String,
    pub tool_calls: usize,
    pub usage: Usage,
    pub finish_reason: Option<FinishReason>,
}

/// Consumes one completion stream
pub struct StreamConsumer<'a> {
    registry: &'a ToolRegistry,
    on_finish: &'a FinishHook,
}

impl<'a> StreamConsumer<'a> {
    pub fn new(registry: &'a ToolRegistry, on_finish: &'a FinishHook) -> Self {
        Self {
            registry,
            on_finish,
        }
    }

    /// Drive the stream to completion.
    ///
    /// Tool calls are awaited before the next event is pulled. Any error
    /// aborts the attempt and leaves channel termination to the caller.
    pub async fn consume(
        &self,
        mut events: CompletionEventStream,
        store: &mut StateStore,
        channels: &mut ChannelSet,
    ) -> Result<TurnSummary> {
        let mut summary = TurnSummary::default();

        channels.status.update(Status::Responding);
        channels.ui.update(UiNode::Empty);

        while let Some(event) = events.next().await {
            tracing::debug!(kind = event.kind(), "Completion event");
            match event {
                CompletionEvent::TextDelta { delta } => {
                    summary.text.push_str(&delta);
                    channels.text.update(delta);
                    channels
                        .message
                        .update(UiNode::bot_message(summary.text.clone()));
                }
                CompletionEvent::ToolCall {
                    id,
                    name,
                    arguments,
                } => {
                    summary.tool_calls += 1;
                    self.registry
                        .dispatch(
                            ToolInvocation {
                                id,
                                name,
                                arguments,
                            },
                            store,
                            &mut channels.ui,
                        )
                        .await?;
                }
                CompletionEvent::Finish { reason, usage } => {
                    tracing::info!(
                        reason = ?reason,
                        input_tokens = usage.input,
                        output_tokens = usage.output,
                        "Finished completion"
                    );
                    (self.on_finish)(store, &summary.text)?;
                    summary.usage = usage;
                    summary.finish_reason = Some(reason);
                    return Ok(summary);
                }
                CompletionEvent::Error { message } => {
                    return Err(Error::Completion(message));
                }
                CompletionEvent::Unrecognized { kind } => {
                    tracing::error!(kind = %kind, "Unrecognized completion event");
                    return Err(Error::UnrecognizedEvent { kind });
                }
            }
        }

        Err(Error::Completion("stream ended before finish".into()))
    }
}
