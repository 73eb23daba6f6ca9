//! Anthropic Messages API provider

use std::time::Duration;

use crate::{
    error::{Error, Result},
    providers::{CompletionService, get_api_key},
    stream::{CompletionEvent, CompletionEventStream},
    types::{CompletionRequest, Content, FinishReason, Message, Role, Tool, Usage},
};
use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};

const API_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider with an API key
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
        }
    }

    /// Create from environment variable
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(get_api_key(None, "ANTHROPIC_API_KEY")?))
    }

    /// Create a provider whose requests time out after `timeout`.
    ///
    /// A timeout surfaces as an `Error` event on the completion stream.
    pub fn with_timeout(api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
        })
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(&self.api_key).map_err(|_| Error::InvalidApiKey)?,
        );
        headers.insert("accept", HeaderValue::from_static("text/event-stream"));
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        Ok(headers)
    }
}

#[async_trait]
impl CompletionService for AnthropicProvider {
    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionEventStream> {
        let body = build_request(request);
        let url = format!("{}/v1/messages", request.model.base_url);

        tracing::debug!(
            "Anthropic API URL: {} ({} messages, {} tools)",
            url,
            body.messages.len(),
            body.tools.as_ref().map_or(0, |t| t.len())
        );

        let request_builder = self.client.post(&url).headers(self.headers()?).json(&body);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(create_stream(event_source)))
    }
}

fn build_request(request: &CompletionRequest) -> AnthropicRequest {
    let (system, messages) = convert_messages(&request.messages);
    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(convert_tools(&request.tools))
    };

    AnthropicRequest {
        model: request.model.id.clone(),
        messages,
        max_tokens: request.max_tokens.unwrap_or(request.model.max_tokens),
        stream: true,
        system,
        temperature: request.temperature,
        tools,
    }
}

/// Create the event stream from SSE events
fn create_stream(mut event_source: EventSource) -> impl futures::Stream<Item = CompletionEvent> {
    stream! {
        let mut decoder = StreamDecoder::default();

        while let Some(event_result) = event_source.next().await {
            match event_result {
                Ok(Event::Open) => {}
                Ok(Event::Message(message)) => {
                    let decoded = decoder.decode(&message.event, &message.data);
                    for event in decoded.events {
                        yield event;
                    }
                    if decoded.finished {
                        break;
                    }
                }
                Err(e) => {
                    yield CompletionEvent::Error { message: e.to_string() };
                    break;
                }
            }
        }

        event_source.close();
    }
}

// ============================================================================
// SSE decoding
// ============================================================================

#[derive(Debug, Default)]
enum ContentBlock {
    #[default]
    Empty,
    Text,
    ToolCall {
        id: String,
        name: String,
        arguments_json: String,
    },
    Unsupported,
}

/// Output of decoding one SSE message
#[derive(Debug, Default)]
struct Decoded {
    events: Vec<CompletionEvent>,
    finished: bool,
}

impl Decoded {
    fn event(event: CompletionEvent) -> Self {
        Self {
            events: vec![event],
            finished: false,
        }
    }

    fn terminal(event: CompletionEvent) -> Self {
        Self {
            events: vec![event],
            finished: true,
        }
    }
}

/// Translates Anthropic SSE messages into completion events.
#[derive(Debug, Default)]
struct StreamDecoder {
    blocks: Vec<ContentBlock>,
    usage: Usage,
    finish_reason: Option<FinishReason>,
}

impl StreamDecoder {
    fn decode(&mut self, event: &str, data: &str) -> Decoded {
        match event {
            "message_start" => match serde_json::from_str::<MessageStartEvent>(data) {
                Ok(start) => {
                    self.usage.input = start.message.usage.input_tokens;
                    self.usage.output = start.message.usage.output_tokens;
                    self.usage.cache_read = start.message.usage.cache_read_input_tokens.unwrap_or(0);
                    self.usage.cache_write =
                        start.message.usage.cache_creation_input_tokens.unwrap_or(0);
                    Decoded::default()
                }
                Err(e) => malformed(event, e),
            },
            "content_block_start" => match serde_json::from_str::<ContentBlockStartEvent>(data) {
                Ok(start) => self.start_block(start),
                Err(e) => malformed(event, e),
            },
            "content_block_delta" => match serde_json::from_str::<ContentBlockDeltaEvent>(data) {
                Ok(delta) => self.apply_delta(delta),
                Err(e) => malformed(event, e),
            },
            "content_block_stop" => match serde_json::from_str::<ContentBlockStopEvent>(data) {
                Ok(stop) => self.stop_block(stop.index as usize),
                Err(e) => malformed(event, e),
            },
            "message_delta" => match serde_json::from_str::<MessageDeltaEvent>(data) {
                Ok(delta) => {
                    if let Some(reason) = delta.delta.stop_reason {
                        self.finish_reason = Some(map_stop_reason(&reason));
                    }
                    self.usage.output = delta.usage.output_tokens;
                    Decoded::default()
                }
                Err(e) => malformed(event, e),
            },
            "message_stop" => Decoded::terminal(CompletionEvent::Finish {
                reason: self.finish_reason.unwrap_or(FinishReason::Stop),
                usage: self.usage.clone(),
            }),
            "ping" => Decoded::default(),
            "error" => {
                let message = serde_json::from_str::<ErrorEvent>(data)
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| data.to_string());
                Decoded::terminal(CompletionEvent::Error { message })
            }
            other => Decoded::event(CompletionEvent::Unrecognized {
                kind: other.to_string(),
            }),
        }
    }

    fn start_block(&mut self, start: ContentBlockStartEvent) -> Decoded {
        let index = start.index as usize;
        while self.blocks.len() <= index {
            self.blocks.push(ContentBlock::Empty);
        }

        match start.content_block.block_type.as_str() {
            "text" => {
                self.blocks[index] = ContentBlock::Text;
                match start.content_block.text {
                    Some(text) if !text.is_empty() => {
                        Decoded::event(CompletionEvent::TextDelta { delta: text })
                    }
                    _ => Decoded::default(),
                }
            }
            "tool_use" => {
                self.blocks[index] = ContentBlock::ToolCall {
                    id: start.content_block.id.unwrap_or_default(),
                    name: start.content_block.name.unwrap_or_default(),
                    arguments_json: String::new(),
                };
                Decoded::default()
            }
            other => {
                self.blocks[index] = ContentBlock::Unsupported;
                Decoded::event(CompletionEvent::Unrecognized {
                    kind: format!("content_block:{}", other),
                })
            }
        }
    }

    fn apply_delta(&mut self, delta: ContentBlockDeltaEvent) -> Decoded {
        let index = delta.index as usize;
        let Some(block) = self.blocks.get_mut(index) else {
            return Decoded::event(CompletionEvent::Unrecognized {
                kind: format!("delta for unknown block {}", index),
            });
        };

        match (delta.delta.delta_type.as_str(), block) {
            ("text_delta", ContentBlock::Text) => Decoded::event(CompletionEvent::TextDelta {
                delta: delta.delta.text.unwrap_or_default(),
            }),
            ("input_json_delta", ContentBlock::ToolCall { arguments_json, .. }) => {
                arguments_json.push_str(&delta.delta.partial_json.unwrap_or_default());
                Decoded::default()
            }
            (_, ContentBlock::Unsupported) => Decoded::default(),
            (other, _) => Decoded::event(CompletionEvent::Unrecognized {
                kind: format!("delta:{}", other),
            }),
        }
    }

    fn stop_block(&mut self, index: usize) -> Decoded {
        match self.blocks.get_mut(index).map(std::mem::take) {
            Some(ContentBlock::ToolCall {
                id,
                name,
                arguments_json,
            }) => Decoded::event(CompletionEvent::ToolCall {
                id,
                name,
                arguments: parse_arguments(&arguments_json),
            }),
            _ => Decoded::default(),
        }
    }
}

/// Parse streamed tool arguments. Tools without parameters stream nothing;
/// unparsable input is passed through as a string so validation rejects it.
fn parse_arguments(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

fn malformed(event: &str, error: serde_json::Error) -> Decoded {
    Decoded::terminal(CompletionEvent::Error {
        message: format!("Malformed {} event: {}", event, error),
    })
}

fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolUse,
        _ => FinishReason::Stop,
    }
}

// ============================================================================
// Request types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

// ============================================================================
// Response event types
// ============================================================================

#[derive(Debug, Deserialize)]
struct MessageStartEvent {
    message: MessageInfo,
}

#[derive(Debug, Deserialize)]
struct MessageInfo {
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct UsageInfo {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    cache_read_input_tokens: Option<u32>,
    cache_creation_input_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStartEvent {
    index: u32,
    content_block: ContentBlockInfo,
}

#[derive(Debug, Deserialize)]
struct ContentBlockInfo {
    #[serde(rename = "type")]
    block_type: String,
    id: Option<String>,
    name: Option<String>,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockDeltaEvent {
    index: u32,
    delta: DeltaInfo,
}

#[derive(Debug, Deserialize)]
struct DeltaInfo {
    #[serde(rename = "type")]
    delta_type: String,
    text: Option<String>,
    partial_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlockStopEvent {
    index: u32,
}

#[derive(Debug, Deserialize)]
struct MessageDeltaEvent {
    delta: MessageDelta,
    usage: UsageInfo,
}

#[derive(Debug, Deserialize)]
struct MessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEvent {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

// ============================================================================
// Conversion functions
// ============================================================================

/// Split system instructions out of the history and merge consecutive
/// same-role turns, which the Messages API requires to alternate.
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system_parts = vec![];
    let mut result: Vec<AnthropicMessage> = vec![];

    for message in messages {
        let role = match message.role {
            Role::System => {
                let text = message.text();
                if !text.trim().is_empty() {
                    system_parts.push(text);
                }
                continue;
            }
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        let blocks: Vec<serde_json::Value> = message
            .content
            .clone()
            .into_parts()
            .into_iter()
            .filter_map(|c| match c {
                Content::Text { text } if text.is_empty() => None,
                Content::Text { text } => Some(serde_json::json!({ "type": "text", "text": text })),
                Content::Image { data, mime_type } => Some(serde_json::json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": mime_type,
                        "data": data
                    }
                })),
            })
            .collect();

        if blocks.is_empty() {
            continue;
        }

        match result.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => result.push(AnthropicMessage {
                role,
                content: blocks,
            }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };

    (system, result)
}

fn convert_tools(tools: &[Tool]) -> Vec<AnthropicTool> {
    tools
        .iter()
        .map(|tool| {
            let input_schema = if tool.parameters.is_object() {
                let mut schema = tool.parameters.clone();
                if let Some(obj) = schema.as_object_mut() {
                    obj.entry("type").or_insert(serde_json::json!("object"));
                }
                schema
            } else {
                serde_json::json!({
                    "type": "object",
                    "properties": {},
                    "required": []
                })
            };

            AnthropicTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema,
            }
        })
        .collect()
}
