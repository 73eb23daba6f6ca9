//! Test doubles shared by the unit tests of this crate.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tern_ai::{CompletionEvent, CompletionEventStream, CompletionRequest, CompletionService};

use crate::channel::OutputChannel;
use crate::error::Result;
use crate::message::Message;
use crate::store::StateStore;
use crate::tool::Tool;
use crate::ui::UiNode;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardArgs {
    pub title: String,
}

/// Appends a tagged assistant message and finishes the ui channel with a card
pub struct CardTool;

#[async_trait]
impl Tool for CardTool {
    const NAME: &'static str = "showCard";
    type Args = CardArgs;
    type Props = CardArgs;

    fn description(&self) -> &str {
        "Show a card"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": { "title": { "type": "string" } },
            "required": ["title"]
        })
    }

    async fn call(
        &self,
        args: CardArgs,
        store: &mut StateStore,
        ui: &mut OutputChannel<UiNode>,
    ) -> Result<()> {
        let props = json!({ "title": args.title });
        store.append(Message::assistant("Here's a card.").with_display(Self::NAME, props))?;
        ui.done(Some(self.render(args)));
        Ok(())
    }

    fn render(&self, props: CardArgs) -> UiNode {
        UiNode::bot_card(UiNode::component("Card", json!({ "title": props.title })))
    }
}

/// Panics when called
pub struct PanicTool;

#[async_trait]
impl Tool for PanicTool {
    const NAME: &'static str = "explode";
    type Args = Value;
    type Props = Value;

    fn description(&self) -> &str {
        "Panic inside the turn task"
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn call(
        &self,
        _args: Value,
        _store: &mut StateStore,
        _ui: &mut OutputChannel<UiNode>,
    ) -> Result<()> {
        panic!("tool exploded");
    }

    fn render(&self, _props: Value) -> UiNode {
        UiNode::Empty
    }
}

/// One scripted reply of the mock service
pub enum Reply {
    Events(Vec<CompletionEvent>),
    Refuse(String),
}

/// Completion service that replays scripted replies in order and records
/// every request it receives.
pub struct ScriptedService {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedService {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(vec![]),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn stream(&self, request: &CompletionRequest) -> tern_ai::Result<CompletionEventStream> {
        self.requests.lock().push(request.clone());
        let reply = self
            .replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Reply::Refuse("no scripted reply left".into()));
        match reply {
            Reply::Events(events) => Ok(Box::pin(async_stream::stream! {
                for event in events {
                    tokio::task::yield_now().await;
                    yield event;
                }
            })),
            Reply::Refuse(message) => Err(tern_ai::Error::api("overloaded_error", message)),
        }
    }
}

pub fn text_reply(parts: &[&str]) -> Reply {
    let mut events: Vec<CompletionEvent> = parts.iter().map(|p| CompletionEvent::text(*p)).collect();
    events.push(CompletionEvent::finish());
    Reply::Events(events)
}

pub fn error_reply(message: &str) -> Reply {
    Reply::Events(vec![CompletionEvent::Error {
        message: message.into(),
    }])
}

pub fn tool_call(name: &str, arguments: Value) -> CompletionEvent {
    CompletionEvent::ToolCall {
        id: "toolu_01".into(),
        name: name.into(),
        arguments,
    }
}
