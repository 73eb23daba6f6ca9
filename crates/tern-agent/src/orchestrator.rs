//! Turn orchestration: drafting the prompt, streaming the completion, the
//! single retry and the one finalizer that closes everything.

use std::sync::Arc;

use tern_ai::{CompletionRequest, CompletionService, Model};

use crate::channel::ChannelSet;
use crate::consumer::{FinishHook, StreamConsumer, TurnSummary, append_assistant_text};
use crate::error::{Error, Result};
use crate::message::ConversationState;
use crate::retry::RetryContext;
use crate::store::StateStore;
use crate::tool::ToolRegistry;
use crate::ui::{Status, UiNode};

/// Turns the stored log into the history sent to the model
pub type PrepareHistory =
    Arc<dyn Fn(Vec<tern_ai::Message>) -> Vec<tern_ai::Message> + Send + Sync>;

/// History hook that sends the log unchanged
pub fn passthrough() -> PrepareHistory {
    Arc::new(|history| history)
}

/// History hook that prepends a fixed system instruction
pub fn with_system_prompt(prompt: impl Into<String>) -> PrepareHistory {
    let prompt = prompt.into();
    Arc::new(move |history| {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(tern_ai::Message::system(prompt.clone()));
        messages.extend(history);
        messages
    })
}

/// Which failures earn the single second attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Whether a failed first attempt is retried at all
    pub enabled: bool,
    /// Retry when the stream produced an event kind we do not handle
    pub retry_protocol_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            retry_protocol_errors: false,
        }
    }
}

impl RetryPolicy {
    /// Never retry
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn is_retryable(&self, error: &Error) -> bool {
        if !self.enabled {
            return false;
        }
        match error {
            Error::Validation { .. } | Error::UnknownTool { .. } | Error::Completion(_) => true,
            Error::Service(e) => !e.is_configuration(),
            Error::UnrecognizedEvent { .. } => self.retry_protocol_errors,
            Error::HistoryRewrite(_)
            | Error::Attachment(_)
            | Error::Persistence(_)
            | Error::Abandoned
            | Error::Closed => false,
        }
    }
}

/// Model parameters for each request
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: Model,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ModelSettings {
    pub fn new(model: Model) -> Self {
        Self {
            model,
            temperature: Some(0.0),
            max_tokens: None,
        }
    }
}

/// How a turn ended
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Succeeded(TurnSummary),
    Failed(Arc<Error>),
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TurnOutcome::Succeeded(_))
    }

    pub fn error(&self) -> Option<&Arc<Error>> {
        match self {
            TurnOutcome::Failed(e) => Some(e),
            TurnOutcome::Succeeded(_) => None,
        }
    }
}

/// Result of a finished turn: the sealed snapshot and the outcome
#[derive(Debug, Clone)]
pub struct TurnReport {
    pub state: ConversationState,
    pub outcome: TurnOutcome,
}

/// Drives one turn through at most two attempts
#[derive(Clone)]
pub struct Orchestrator {
    service: Arc<dyn CompletionService>,
    registry: Arc<ToolRegistry>,
    settings: ModelSettings,
    policy: RetryPolicy,
    prepare: PrepareHistory,
    on_finish: FinishHook,
    final_ui: Option<UiNode>,
}

impl Orchestrator {
    pub fn new(
        service: Arc<dyn CompletionService>,
        registry: Arc<ToolRegistry>,
        settings: ModelSettings,
    ) -> Self {
        Self {
            service,
            registry,
            settings,
            policy: RetryPolicy::default(),
            prepare: passthrough(),
            on_finish: append_assistant_text(),
            final_ui: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_prepare(mut self, prepare: PrepareHistory) -> Self {
        self.prepare = prepare;
        self
    }

    pub fn with_finish_hook(mut self, on_finish: FinishHook) -> Self {
        self.on_finish = on_finish;
        self
    }

    /// Value the ui channel ends with on success, unless a tool closed it
    pub fn with_final_ui(mut self, node: UiNode) -> Self {
        self.final_ui = Some(node);
        self
    }

    /// Run the turn to its end. Every channel is terminated and the store is
    /// sealed exactly once before this returns.
    pub async fn run(&self, mut store: StateStore, mut channels: ChannelSet) -> TurnReport {
        let outcome = match self.attempt(&mut store, &mut channels, None).await {
            Ok(summary) => TurnOutcome::Succeeded(summary),
            Err(first) if self.policy.is_retryable(&first) => {
                tracing::warn!(kind = first.kind(), "Completion attempt failed, retrying: {}", first);
                channels.notify_retry();
                let context = RetryContext::from_error(&first);
                match self.attempt(&mut store, &mut channels, Some(&context)).await {
                    Ok(summary) => TurnOutcome::Succeeded(summary),
                    Err(second) => {
                        tracing::error!(kind = second.kind(), "Retry failed: {}", second);
                        TurnOutcome::Failed(Arc::new(second))
                    }
                }
            }
            Err(first) => {
                tracing::error!(kind = first.kind(), "Completion failed: {}", first);
                TurnOutcome::Failed(Arc::new(first))
            }
        };

        self.finalize(store, channels, outcome)
    }

    async fn attempt(
        &self,
        store: &mut StateStore,
        channels: &mut ChannelSet,
        retry: Option<&RetryContext>,
    ) -> Result<TurnSummary> {
        let mut messages = (self.prepare)(store.current().prompt_history());
        if let Some(context) = retry {
            context.apply(&mut messages);
        }

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            tools: self.registry.definitions(),
            messages,
        };
        tracing::debug!(
            model = %request.model.id,
            messages = request.messages.len(),
            retry = retry.is_some(),
            "Starting completion"
        );

        let events = self.service.stream(&request).await?;
        StreamConsumer::new(&self.registry, &self.on_finish)
            .consume(events, store, channels)
            .await
    }

    fn finalize(&self, store: StateStore, channels: ChannelSet, outcome: TurnOutcome) -> TurnReport {
        close_turn(store, channels, outcome, self.final_ui.clone())
    }
}

/// End a turn that could not start, failing every channel with `error`
pub fn reject(store: StateStore, channels: ChannelSet, error: Error) -> TurnReport {
    tracing::error!(kind = error.kind(), "Turn rejected: {}", error);
    close_turn(store, channels, TurnOutcome::Failed(Arc::new(error)), None)
}

/// End a turn that needs no completion: it succeeds with whatever the caller
/// already wrote to the store, ending *status* and *ui* with the given values.
pub fn settle(
    store: StateStore,
    mut channels: ChannelSet,
    final_status: Option<Status>,
    final_ui: Option<UiNode>,
) -> TurnReport {
    if final_status.is_some() {
        channels.status.done(final_status);
    }
    close_turn(
        store,
        channels,
        TurnOutcome::Succeeded(TurnSummary::default()),
        final_ui,
    )
}

fn close_turn(
    mut store: StateStore,
    mut channels: ChannelSet,
    outcome: TurnOutcome,
    final_ui: Option<UiNode>,
) -> TurnReport {
    match &outcome {
        TurnOutcome::Succeeded(_) => {
            if final_ui.is_some() {
                channels.ui.done(final_ui);
            }
            channels.close_all(None);
        }
        TurnOutcome::Failed(e) => channels.close_all(Some(e.clone())),
    }
    store.done(None);

    TurnReport {
        state: store.into_state(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelEvent, RETRY_NOTICE};
    use crate::message::Message;
    use crate::retry::NO_APOLOGY;
    use crate::testing::{
        CardTool, Reply, ScriptedService, error_reply, text_reply, tool_call,
    };
    use serde_json::json;
    use tern_ai::{CompletionEvent, Role};

    fn orchestrator(service: Arc<ScriptedService>) -> Orchestrator {
        let mut registry = ToolRegistry::new();
        registry.register(CardTool).unwrap();
        Orchestrator::new(
            service,
            Arc::new(registry),
            ModelSettings::new(tern_ai::models::custom_model("test-model", None)),
        )
    }

    fn store_with_user(text: &str) -> StateStore {
        let mut state = ConversationState::with_id("c");
        state.messages.push(Message::user(text));
        StateStore::new(state)
    }

    #[tokio::test]
    async fn test_success_closes_all_channels_once() {
        let service = Arc::new(ScriptedService::new(vec![text_reply(&["Hi", " there"])]));
        let (channels, handles) = ChannelSet::new();

        let report = orchestrator(service.clone())
            .run(store_with_user("Hi"), channels)
            .await;

        assert!(report.outcome.is_success());
        assert_eq!(report.state.messages.len(), 2);
        assert_eq!(report.state.messages[1].text(), "Hi there");
        assert_eq!(service.call_count(), 1);

        let status = handles.status.collect_events().await;
        assert_eq!(status.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(matches!(status.last(), Some(ChannelEvent::Done(None))));
        let message = handles.message.latest().await.unwrap();
        assert_eq!(message, Some(UiNode::bot_message("Hi there")));
        assert_eq!(handles.text.concat().await.unwrap(), "Hi there");
        let ui = handles.ui.collect_events().await;
        assert_eq!(ui.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn test_retry_injects_feedback() {
        let service = Arc::new(ScriptedService::new(vec![
            Reply::Events(vec![tool_call("showCard", json!({ "title": 3 }))]),
            text_reply(&["Sorted."]),
        ]));
        let (channels, handles) = ChannelSet::new();

        let report = orchestrator(service.clone())
            .run(store_with_user("card please"), channels)
            .await;
        assert!(report.outcome.is_success());

        let requests = service.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].messages.len(), 1);
        let retry = &requests[1].messages;
        assert_eq!(retry.len(), 4);
        assert_eq!(retry[1].role, Role::Assistant);
        assert_eq!(
            retry[1].text(),
            "Call 'showCard' with arguments: {\"title\":3}"
        );
        assert!(retry[2].text().starts_with("Invalid arguments for tool 'showCard'"));
        assert_eq!(retry[3].text(), NO_APOLOGY);

        // feedback stays out of the log
        assert_eq!(report.state.messages.len(), 2);
        assert_eq!(report.state.messages[1].text(), "Sorted.");

        let status = handles.status.collect_events().await;
        assert!(status.iter().any(|e| matches!(
            e,
            ChannelEvent::Update(Status::Retrying { notice }) if notice == RETRY_NOTICE
        )));
    }

    fn unknown_then_card() -> Reply {
        Reply::Events(vec![
            tool_call("bookTrain", json!({})),
            tool_call("showCard", json!({ "title": "x" })),
            CompletionEvent::finish(),
        ])
    }

    fn has_card(events: &[ChannelEvent<UiNode>]) -> bool {
        events.iter().any(|e| {
            matches!(
                e,
                ChannelEvent::Update(UiNode::BotCard { .. })
                    | ChannelEvent::Done(Some(UiNode::BotCard { .. }))
            )
        })
    }

    #[tokio::test]
    async fn test_settle_succeeds_without_completion() {
        let (channels, handles) = ChannelSet::new();
        let mut store = store_with_user("pay");
        store.append(Message::assistant("done")).unwrap();

        let report = settle(
            store,
            channels,
            Some(Status::Completed),
            Some(UiNode::Spinner),
        );
        assert!(report.outcome.is_success());
        assert_eq!(report.state.messages.len(), 2);

        let status = handles.status.collect_events().await;
        assert!(matches!(status.last(), Some(ChannelEvent::Done(Some(Status::Completed)))));
        assert_eq!(status.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(handles.ui.latest().await.unwrap(), Some(UiNode::Spinner));
        assert_eq!(handles.text.concat().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_unknown_tool_stops_the_attempt() {
        let service = Arc::new(ScriptedService::new(vec![unknown_then_card()]));
        let (channels, handles) = ChannelSet::new();

        let report = orchestrator(service.clone())
            .with_policy(RetryPolicy::disabled())
            .run(store_with_user("train to Porto"), channels)
            .await;

        let err = report.outcome.error().unwrap();
        assert!(matches!(&**err, Error::UnknownTool { name, .. } if name == "bookTrain"));
        // showCard never ran
        assert_eq!(report.state.messages.len(), 1);
        let ui = handles.ui.collect_events().await;
        assert!(!has_card(&ui));
        assert!(matches!(ui.last(), Some(ChannelEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_unknown_tool_feedback_on_retry() {
        let service = Arc::new(ScriptedService::new(vec![
            unknown_then_card(),
            text_reply(&["No trains, sorry."]),
        ]));
        let (channels, handles) = ChannelSet::new();

        let report = orchestrator(service.clone())
            .run(store_with_user("train to Porto"), channels)
            .await;
        assert!(report.outcome.is_success());

        let retry = &service.requests()[1].messages;
        assert_eq!(retry[1].role, Role::Assistant);
        assert_eq!(retry[1].text(), "Call 'bookTrain' with arguments: {}");
        assert_eq!(retry[2].text(), "No tool 'bookTrain' found.");

        let texts: Vec<String> = report.state.messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["train to Porto", "No trains, sorry."]);
        assert!(!has_card(&handles.ui.collect_events().await));
    }

    #[tokio::test]
    async fn test_double_error_fails_every_channel() {
        let service = Arc::new(ScriptedService::new(vec![
            error_reply("first"),
            error_reply("second"),
        ]));
        let (channels, handles) = ChannelSet::new();

        let report = orchestrator(service.clone())
            .run(store_with_user("Hi"), channels)
            .await;

        let err = report.outcome.error().unwrap();
        assert_eq!(err.to_string(), "Completion failed: second");
        assert_eq!(service.call_count(), 2);
        assert_eq!(report.state.messages.len(), 1);

        assert!(handles.status.latest().await.is_err());
        assert!(handles.text.concat().await.is_err());
        assert!(handles.message.latest().await.is_err());
        let ui = handles.ui.collect_events().await;
        assert!(matches!(ui.last(), Some(ChannelEvent::Error(e)) if e.to_string() == "Completion failed: second"));
    }

    #[tokio::test]
    async fn test_at_most_one_retry() {
        let service = Arc::new(ScriptedService::new(vec![
            error_reply("one"),
            error_reply("two"),
            text_reply(&["never sent"]),
        ]));
        let (channels, _handles) = ChannelSet::new();

        let report = orchestrator(service.clone())
            .run(store_with_user("Hi"), channels)
            .await;
        assert!(!report.outcome.is_success());
        assert_eq!(service.call_count(), 2);
    }

    #[tokio::test]
    async fn test_service_refusal_is_retried() {
        let service = Arc::new(ScriptedService::new(vec![
            Reply::Refuse("busy".into()),
            text_reply(&["ok"]),
        ]));
        let (channels, _handles) = ChannelSet::new();

        let report = orchestrator(service.clone())
            .run(store_with_user("Hi"), channels)
            .await;
        assert!(report.outcome.is_success());
        assert_eq!(service.call_count(), 2);
    }

    #[tokio::test]
    async fn test_protocol_error_policy() {
        let unrecognized = || {
            Reply::Events(vec![CompletionEvent::Unrecognized {
                kind: "content_block:thinking".into(),
            }])
        };

        let service = Arc::new(ScriptedService::new(vec![unrecognized(), text_reply(&["ok"])]));
        let (channels, _handles) = ChannelSet::new();
        let report = orchestrator(service.clone())
            .run(store_with_user("Hi"), channels)
            .await;
        assert!(matches!(
            report.outcome.error().map(|e| e.as_ref()),
            Some(Error::UnrecognizedEvent { .. })
        ));
        assert_eq!(service.call_count(), 1);

        let service = Arc::new(ScriptedService::new(vec![unrecognized(), text_reply(&["ok"])]));
        let (channels, _handles) = ChannelSet::new();
        let report = orchestrator(service.clone())
            .with_policy(RetryPolicy {
                enabled: true,
                retry_protocol_errors: true,
            })
            .run(store_with_user("Hi"), channels)
            .await;
        assert!(report.outcome.is_success());
        assert_eq!(service.call_count(), 2);
    }

    #[tokio::test]
    async fn test_system_prompt_is_prepended() {
        let service = Arc::new(ScriptedService::new(vec![text_reply(&["ok"])]));
        let (channels, _handles) = ChannelSet::new();

        orchestrator(service.clone())
            .with_prepare(with_system_prompt("Be brief."))
            .run(store_with_user("Hi"), channels)
            .await;

        let request = &service.requests()[0];
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].text(), "Be brief.");
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.temperature, Some(0.0));
    }

    #[tokio::test]
    async fn test_final_ui_unless_tool_closed_it() {
        let service = Arc::new(ScriptedService::new(vec![text_reply(&["ok"])]));
        let (channels, handles) = ChannelSet::new();
        orchestrator(service)
            .with_final_ui(UiNode::Spinner)
            .run(store_with_user("Hi"), channels)
            .await;
        assert_eq!(handles.ui.latest().await.unwrap(), Some(UiNode::Spinner));

        let service = Arc::new(ScriptedService::new(vec![Reply::Events(vec![
            tool_call("showCard", json!({ "title": "Nice" })),
            CompletionEvent::finish(),
        ])]));
        let (channels, handles) = ChannelSet::new();
        orchestrator(service)
            .with_final_ui(UiNode::Spinner)
            .run(store_with_user("Hi"), channels)
            .await;
        assert!(matches!(
            handles.ui.latest().await.unwrap(),
            Some(UiNode::BotCard { .. })
        ));
    }

    #[test]
    fn test_configuration_errors_are_not_retried() {
        let policy = RetryPolicy::default();
        assert!(!policy.is_retryable(&Error::Service(tern_ai::Error::InvalidApiKey)));
        assert!(policy.is_retryable(&Error::Completion("x".into())));
        assert!(!RetryPolicy::disabled().is_retryable(&Error::Completion("x".into())));
    }

    #[tokio::test]
    async fn test_reject_fails_every_channel() {
        let (channels, handles) = ChannelSet::new();
        let report = reject(
            store_with_user("Hi"),
            channels,
            Error::Attachment("video attachments are not supported".into()),
        );
        assert!(!report.outcome.is_success());
        assert_eq!(report.state.messages.len(), 1);
        let err = handles.ui.latest().await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid attachment: video attachments are not supported"
        );
        assert!(handles.status.latest().await.is_err());
    }
}
