//! Output channels for a single turn.
//!
//! Each channel is a single-writer push stream: zero or more updates followed
//! by exactly one terminal `Done` or `Error`. Pushes after termination are
//! dropped. A producer dropped without terminating emits `Error::Abandoned`
//! so every handle given to a caller eventually terminates.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::Error;
use crate::ui::{Status, UiNode};

/// Notice shown while the second attempt runs
pub const RETRY_NOTICE: &str = "Please, allow me just one more second while I try again...";

/// An event observed on an output channel
#[derive(Debug, Clone)]
pub enum ChannelEvent<T> {
    Update(T),
    Done(Option<T>),
    Error(Arc<Error>),
}

impl<T> ChannelEvent<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ChannelEvent::Update(_))
    }
}

/// Producer half of an output channel
#[derive(Debug)]
pub struct OutputChannel<T> {
    name: &'static str,
    tx: mpsc::UnboundedSender<ChannelEvent<T>>,
    closed: bool,
}

impl<T> OutputChannel<T> {
    /// Create a named channel and its receiver
    pub fn new(name: &'static str) -> (Self, ChannelReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                name,
                tx,
                closed: false,
            },
            ChannelReceiver { rx },
        )
    }

    /// Push an intermediate value
    pub fn update(&mut self, value: T) {
        if self.closed {
            tracing::debug!(channel = self.name, "Dropping update on closed channel");
            return;
        }
        self.send(ChannelEvent::Update(value));
    }

    /// Terminate successfully, optionally with a final value
    pub fn done(&mut self, value: Option<T>) {
        if self.closed {
            tracing::debug!(channel = self.name, "Channel already closed");
            return;
        }
        self.closed = true;
        self.send(ChannelEvent::Done(value));
    }

    /// Terminate with an error
    pub fn error(&mut self, error: Arc<Error>) {
        if self.closed {
            tracing::debug!(channel = self.name, "Channel already closed");
            return;
        }
        self.closed = true;
        self.send(ChannelEvent::Error(error));
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn send(&self, event: ChannelEvent<T>) {
        // A receiver that went away just stops listening.
        let _ = self.tx.send(event);
    }
}

impl<T> Drop for OutputChannel<T> {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(channel = self.name, "Channel dropped without terminating");
            self.closed = true;
            self.send(ChannelEvent::Error(Arc::new(Error::Abandoned)));
        }
    }
}

/// Consumer half of an output channel
#[derive(Debug)]
pub struct ChannelReceiver<T> {
    rx: mpsc::UnboundedReceiver<ChannelEvent<T>>,
}

impl<T> ChannelReceiver<T> {
    /// Next event, or `None` once the producer is gone
    pub async fn recv(&mut self) -> Option<ChannelEvent<T>> {
        self.rx.recv().await
    }

    /// Drain every event until the channel ends
    pub async fn collect_events(self) -> Vec<ChannelEvent<T>> {
        self.collect().await
    }

    /// Drain the channel and return the last value it carried.
    ///
    /// A final `Done(Some(v))` wins over earlier updates; `Done(None)` keeps
    /// the last update. An error terminal is returned as `Err`.
    pub async fn latest(mut self) -> std::result::Result<Option<T>, Arc<Error>> {
        let mut last = None;
        while let Some(event) = self.rx.recv().await {
            match event {
                ChannelEvent::Update(value) => last = Some(value),
                ChannelEvent::Done(value) => {
                    if value.is_some() {
                        last = value;
                    }
                    break;
                }
                ChannelEvent::Error(e) => return Err(e),
            }
        }
        Ok(last)
    }
}

impl ChannelReceiver<String> {
    /// Concatenate every text delta until the channel ends
    pub async fn concat(mut self) -> std::result::Result<String, Arc<Error>> {
        let mut text = String::new();
        while let Some(event) = self.rx.recv().await {
            match event {
                ChannelEvent::Update(delta) => text.push_str(&delta),
                ChannelEvent::Done(tail) => {
                    if let Some(tail) = tail {
                        text.push_str(&tail);
                    }
                    break;
                }
                ChannelEvent::Error(e) => return Err(e),
            }
        }
        Ok(text)
    }
}

impl<T> Stream for ChannelReceiver<T> {
    type Item = ChannelEvent<T>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// The four producer channels of a turn
#[derive(Debug)]
pub struct ChannelSet {
    pub status: OutputChannel<Status>,
    pub text: OutputChannel<String>,
    pub message: OutputChannel<UiNode>,
    pub ui: OutputChannel<UiNode>,
}

/// The four consumer handles of a turn
#[derive(Debug)]
pub struct ChannelHandles {
    pub status: ChannelReceiver<Status>,
    pub text: ChannelReceiver<String>,
    pub message: ChannelReceiver<UiNode>,
    pub ui: ChannelReceiver<UiNode>,
}

impl ChannelSet {
    /// Create a fresh set. The status channel starts at `Thinking`.
    pub fn new() -> (Self, ChannelHandles) {
        let (mut status, status_rx) = OutputChannel::new("status");
        let (text, text_rx) = OutputChannel::new("text");
        let (message, message_rx) = OutputChannel::new("message");
        let (ui, ui_rx) = OutputChannel::new("ui");
        status.update(Status::Thinking);
        (
            Self {
                status,
                text,
                message,
                ui,
            },
            ChannelHandles {
                status: status_rx,
                text: text_rx,
                message: message_rx,
                ui: ui_rx,
            },
        )
    }

    /// Terminate every channel that is still open.
    ///
    /// With `None` each open channel gets `Done(None)`, otherwise each gets the
    /// shared error. Channels already closed (a tool may finish `ui` itself)
    /// are skipped.
    pub fn close_all(&mut self, error: Option<Arc<Error>>) {
        match error {
            None => {
                self.status.done(None);
                self.text.done(None);
                self.message.done(None);
                self.ui.done(None);
            }
            Some(e) => {
                self.status.error(e.clone());
                self.text.error(e.clone());
                self.message.error(e.clone());
                self.ui.error(e);
            }
        }
    }

    /// Tell the client a second attempt is starting
    pub fn notify_retry(&mut self) {
        self.status.update(Status::Retrying {
            notice: RETRY_NOTICE.to_string(),
        });
        self.ui.update(UiNode::fragment(vec![
            UiNode::system_message(RETRY_NOTICE),
            UiNode::Spinner,
        ]));
    }

    pub fn all_closed(&self) -> bool {
        self.status.is_closed()
            && self.text.is_closed()
            && self.message.is_closed()
            && self.ui.is_closed()
    }
}
