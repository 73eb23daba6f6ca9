//! Caller-facing session: submits turns, tracks their tasks and hands sealed
//! snapshots to persistence.
//!
//! Entry points return channel handles immediately and run the turn on a
//! spawned task. Turns of one session run strictly in submission order: each
//! task waits for its predecessor to seal before opening the store.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tern_ai::CompletionService;
use tokio::sync::{oneshot, watch};
use tokio_util::task::TaskTracker;

use crate::attachment::{Attachment, attachment_card};
use crate::channel::{ChannelHandles, ChannelSet};
use crate::consumer::FinishHook;
use crate::error::{Error, Result};
use crate::message::{ConversationState, Message, message_id};
use crate::orchestrator::{
    ModelSettings, Orchestrator, PrepareHistory, RetryPolicy, TurnReport, reject, settle,
};
use crate::persist::{Chat, ChatStore, Identity};
use crate::purchase::{CODE_SENT, PURCHASE_COMPLETED, fulfillment_card, payment_succeeded_card};
use crate::store::StateStore;
use crate::tool::ToolRegistry;
use crate::ui::{Status, UiEntry, UiNode, ui_state};

/// Instruction sent with an attachment
pub const DEFAULT_ATTACHMENT_PROMPT: &str = "List the books in this image.";

/// Live output of one turn
#[derive(Debug)]
pub struct TurnHandle {
    pub turn_id: String,
    pub channels: ChannelHandles,
}

/// How a spawned turn produces its result
enum TurnPlan {
    /// Ask the completion service
    Complete(Orchestrator),
    /// Already written to the store; end the channels with these values
    Local {
        status: Option<Status>,
        ui: Option<UiNode>,
    },
}

/// Builder for [`Session`]
pub struct SessionBuilder {
    service: Arc<dyn CompletionService>,
    registry: Arc<ToolRegistry>,
    settings: ModelSettings,
    policy: RetryPolicy,
    prepare: Option<PrepareHistory>,
    attachment_prompt: String,
    identity: Option<Identity>,
    chat_store: Option<Arc<dyn ChatStore>>,
    state: Option<ConversationState>,
    created_at: Option<DateTime<Utc>>,
}

impl SessionBuilder {
    pub fn model(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Hook shaping the history of travel-assistant turns
    pub fn prepare_history(mut self, prepare: PrepareHistory) -> Self {
        self.prepare = Some(prepare);
        self
    }

    pub fn attachment_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.attachment_prompt = prompt.into();
        self
    }

    pub fn identity(mut self, identity: Identity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn chat_store(mut self, store: Arc<dyn ChatStore>) -> Self {
        self.chat_store = Some(store);
        self
    }

    /// Start from an existing conversation
    pub fn state(mut self, state: ConversationState) -> Self {
        self.state = Some(state);
        self
    }

    /// Resume a persisted chat owned by the session's identity
    pub async fn resume(mut self, chat_id: &str) -> Result<Session> {
        let (Some(identity), Some(store)) = (&self.identity, &self.chat_store) else {
            return Err(Error::Persistence(
                "resuming a chat requires an identity and a chat store".into(),
            ));
        };
        let chat = store
            .load_chat(chat_id, &identity.user_id)
            .await?
            .ok_or_else(|| Error::Persistence(format!("chat '{}' not found", chat_id)))?;
        tracing::info!(chat_id, messages = chat.messages.len(), "Resuming chat");
        self.created_at = Some(chat.created_at);
        self.state = Some(chat.into_state());
        Ok(self.build())
    }

    pub fn build(self) -> Session {
        let mut orchestrator =
            Orchestrator::new(self.service, self.registry.clone(), self.settings)
                .with_policy(self.policy);
        if let Some(prepare) = self.prepare {
            orchestrator = orchestrator.with_prepare(prepare);
        }
        let (idle_tx, _) = watch::channel(0usize);

        Session {
            inner: Arc::new(Inner {
                orchestrator,
                registry: self.registry,
                attachment_prompt: self.attachment_prompt,
                identity: self.identity,
                chat_store: self.chat_store,
                created_at: self.created_at.unwrap_or_else(Utc::now),
                state: RwLock::new(self.state.unwrap_or_default()),
                tail: Mutex::new(None),
                tracker: TaskTracker::new(),
                in_flight: idle_tx,
                closed: AtomicBool::new(false),
            }),
        }
    }
}

struct Inner {
    orchestrator: Orchestrator,
    registry: Arc<ToolRegistry>,
    attachment_prompt: String,
    identity: Option<Identity>,
    chat_store: Option<Arc<dyn ChatStore>>,
    created_at: DateTime<Utc>,
    /// Last sealed snapshot
    state: RwLock<ConversationState>,
    /// Completion signal of the most recently submitted turn
    tail: Mutex<Option<oneshot::Receiver<()>>>,
    tracker: TaskTracker,
    in_flight: watch::Sender<usize>,
    closed: AtomicBool,
}

impl Inner {
    async fn persist(&self, state: &ConversationState) {
        let (Some(identity), Some(store)) = (&self.identity, &self.chat_store) else {
            return;
        };
        if state.messages.is_empty() {
            return;
        }
        let chat = Chat::from_state(state, &identity.user_id, self.created_at);
        match store.save_chat(&chat).await {
            Ok(()) => tracing::debug!(chat_id = %chat.id, "Saved chat"),
            Err(e) => tracing::error!(chat_id = %chat.id, "Failed to save chat: {}", e),
        }
    }
}

/// A conversation with the travel assistant. Cloning shares the session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl Session {
    pub fn builder(service: Arc<dyn CompletionService>, registry: Arc<ToolRegistry>) -> SessionBuilder {
        SessionBuilder {
            service,
            registry,
            settings: ModelSettings::new(tern_ai::models::resolve_model(
                tern_ai::models::DEFAULT_MODEL_ID,
                None,
            )),
            policy: RetryPolicy::default(),
            prepare: None,
            attachment_prompt: DEFAULT_ATTACHMENT_PROMPT.to_string(),
            identity: None,
            chat_store: None,
            state: None,
            created_at: None,
        }
    }

    /// Submit a user message. Pending interactions are prepended to the text
    /// and cleared.
    pub fn submit(&self, text: impl Into<String>) -> TurnHandle {
        let text = text.into();
        let orchestrator = self.inner.orchestrator.clone();
        self.spawn_turn(move |store| {
            let mut next = store.get();
            let content = next
                .interactions
                .drain(..)
                .chain(std::iter::once(text))
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("\n\n");
            next.messages.push(Message::user(content));
            store.update(next)?;
            Ok(TurnPlan::Complete(orchestrator))
        })
    }

    /// Describe an image attachment given as a `data:` URL.
    ///
    /// The description is stored in the pending interactions rather than the
    /// log, so it is folded into the next submitted message.
    pub fn describe_attachment(&self, data_url: impl Into<String>) -> TurnHandle {
        let data_url = data_url.into();
        let prompt = self.inner.attachment_prompt.clone();
        let orchestrator = self.inner.orchestrator.clone();
        self.spawn_turn_with(
            move |channels| channels.ui.update(attachment_card(true)),
            move |_store| {
                let attachment = Attachment::from_data_url(&data_url)?;
                tracing::debug!(mime_type = %attachment.mime_type, "Describing attachment");
                let prepare: PrepareHistory = Arc::new(move |_history| {
                    vec![
                        tern_ai::Message::system(prompt.clone()),
                        tern_ai::Message::user_with_content(vec![attachment.to_content()]),
                    ]
                });
                let remember: FinishHook = Arc::new(|store: &mut StateStore, text: &str| {
                    let mut next = store.get();
                    next.interactions = vec![text.to_string()];
                    store.update(next)
                });
                Ok(TurnPlan::Complete(
                    orchestrator
                        .with_policy(RetryPolicy::disabled())
                        .with_prepare(prepare)
                        .with_finish_hook(remember)
                        .with_final_ui(attachment_card(false)),
                ))
            },
        )
    }

    /// Send a confirmation code for the pending checkout. Status reports
    /// `RequiresCode` while *ui* shows a spinner.
    pub fn request_code(&self) -> TurnHandle {
        self.spawn_turn_with(
            |channels| {
                channels.status.update(Status::RequiresCode);
                channels.ui.update(UiNode::Spinner);
            },
            |store| {
                store.append(Message::assistant(CODE_SENT))?;
                Ok(TurnPlan::Local {
                    status: None,
                    ui: None,
                })
            },
        )
    }

    /// Accept the confirmation code and complete the purchase. Status moves
    /// from `InProgress` to `Completed`; *ui* ends with the payment card.
    pub fn validate_code(&self) -> TurnHandle {
        self.spawn_turn_with(
            |channels| {
                channels.status.update(Status::InProgress);
                channels.ui.update(fulfillment_card());
            },
            |store| {
                store.append(Message::assistant(PURCHASE_COMPLETED))?;
                tracing::info!("Purchase completed");
                Ok(TurnPlan::Local {
                    status: Some(Status::Completed),
                    ui: Some(payment_succeeded_card()),
                })
            },
        )
    }

    /// The last sealed conversation snapshot
    pub fn state(&self) -> ConversationState {
        self.inner.state.read().clone()
    }

    /// The visible transcript of the last sealed snapshot
    pub fn ui_state(&self) -> Vec<UiEntry> {
        ui_state(&self.inner.state.read(), &self.inner.registry)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.inner.registry
    }

    /// Wait until every submitted turn has sealed
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.in_flight.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting turns and join the ones in flight
    pub async fn shutdown(&self) {
        {
            let _tail = self.inner.tail.lock();
            self.inner.closed.store(true, Ordering::Release);
            self.inner.tracker.close();
        }
        self.inner.tracker.wait().await;
        tracing::debug!("Session shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    fn spawn_turn<F>(&self, setup: F) -> TurnHandle
    where
        F: FnOnce(&mut StateStore) -> Result<TurnPlan> + Send + 'static,
    {
        self.spawn_turn_with(|_| {}, setup)
    }

    /// Create the channels, link the turn behind its predecessor and spawn it.
    ///
    /// `prime` runs synchronously on the fresh channels; `setup` runs on the
    /// task once the store is open and decides how the turn ends.
    fn spawn_turn_with<P, F>(&self, prime: P, setup: F) -> TurnHandle
    where
        P: FnOnce(&mut ChannelSet),
        F: FnOnce(&mut StateStore) -> Result<TurnPlan> + Send + 'static,
    {
        let turn_id = message_id();
        let (mut channels, handles) = ChannelSet::new();

        // Held until the task is spawned so `shutdown` cannot slip in between
        let mut tail = self.inner.tail.lock();
        if self.is_closed() {
            drop(tail);
            tracing::warn!(turn_id = %turn_id, "Turn submitted after shutdown");
            let store = StateStore::new(self.state());
            reject(store, channels, Error::Closed);
            return TurnHandle {
                turn_id,
                channels: handles,
            };
        }
        prime(&mut channels);

        let (sealed_tx, sealed_rx) = oneshot::channel();
        let previous = tail.replace(sealed_rx);
        self.inner.in_flight.send_modify(|n| *n += 1);

        let inner = self.inner.clone();
        let id = turn_id.clone();
        let turn = async move {
            if let Some(previous) = previous {
                // A predecessor that panicked drops its sender; proceed anyway.
                let _ = previous.await;
            }

            let mut store = StateStore::new(inner.state.read().clone());
            let report: TurnReport = match setup(&mut store) {
                Ok(TurnPlan::Complete(orchestrator)) => orchestrator.run(store, channels).await,
                Ok(TurnPlan::Local { status, ui }) => settle(store, channels, status, ui),
                Err(e) => reject(store, channels, e),
            };
            tracing::debug!(turn_id = %id, success = report.outcome.is_success(), "Turn sealed");

            *inner.state.write() = report.state.clone();
            // Saved before the successor may start, so saves land in turn order
            inner.persist(&report.state).await;
            let _ = sealed_tx.send(());
        };

        let inner = self.inner.clone();
        let id = turn_id.clone();
        self.inner.tracker.spawn(async move {
            if let Err(panic) = AssertUnwindSafe(turn).catch_unwind().await {
                tracing::error!(turn_id = %id, "Turn task panicked: {}", panic_message(&panic));
            }
            inner.in_flight.send_modify(|n| *n = n.saturating_sub(1));
        });
        drop(tail);

        TurnHandle {
            turn_id,
            channels: handles,
        }
    }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
