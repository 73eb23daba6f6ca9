//! Tool contract and the registry that dispatches tool calls by name.
//!
//! Tools are statically typed: each declares its argument and props types.
//! The registry erases them behind a lookup table keyed by tool name, so the
//! completion stream can name a tool with untyped JSON arguments and still
//! reach a typed handler after schema validation.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::channel::OutputChannel;
use crate::error::{Error, Result};
use crate::store::StateStore;
use crate::ui::UiNode;

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Trait for tools the model can invoke
#[async_trait]
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in API calls and display tags)
    const NAME: &'static str;

    /// Arguments bound from the model's JSON
    type Args: DeserializeOwned + Send;

    /// Props persisted in a message display tag
    type Props: DeserializeOwned;

    /// Tool description for the model
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> Value;

    /// Run the tool inside the current turn.
    ///
    /// Tools may append to the conversation and push to (or finish) the ui
    /// channel. They must not seal the store.
    async fn call(
        &self,
        args: Self::Args,
        store: &mut StateStore,
        ui: &mut OutputChannel<UiNode>,
    ) -> Result<()>;

    /// Render persisted props back into a UI node
    fn render(&self, props: Self::Props) -> UiNode;
}

#[async_trait]
trait ErasedTool: Send + Sync {
    fn definition(&self) -> tern_ai::Tool;

    async fn invoke(
        &self,
        arguments: Value,
        store: &mut StateStore,
        ui: &mut OutputChannel<UiNode>,
    ) -> Result<()>;

    fn render(&self, props: &Value) -> Option<UiNode>;
}

struct Registered<T: Tool> {
    tool: T,
    schema: Value,
    validator: jsonschema::Validator,
}

impl<T: Tool> Registered<T> {
    fn bind(&self, arguments: &Value) -> Result<T::Args> {
        let problems: Vec<String> = self
            .validator
            .iter_errors(arguments)
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{} at {}", e, path)
                }
            })
            .collect();
        if !problems.is_empty() {
            return Err(Error::validation(
                T::NAME,
                arguments.clone(),
                problems.join("; "),
            ));
        }

        serde_json::from_value(arguments.clone())
            .map_err(|e| Error::validation(T::NAME, arguments.clone(), e.to_string()))
    }
}

#[async_trait]
impl<T: Tool> ErasedTool for Registered<T> {
    fn definition(&self) -> tern_ai::Tool {
        tern_ai::Tool {
            name: T::NAME.to_string(),
            description: self.tool.description().to_string(),
            parameters: self.schema.clone(),
        }
    }

    async fn invoke(
        &self,
        arguments: Value,
        store: &mut StateStore,
        ui: &mut OutputChannel<UiNode>,
    ) -> Result<()> {
        let args = self.bind(&arguments)?;
        self.tool.call(args, store, ui).await
    }

    fn render(&self, props: &Value) -> Option<UiNode> {
        match serde_json::from_value::<T::Props>(props.clone()) {
            Ok(props) => Some(self.tool.render(props)),
            Err(e) => {
                tracing::warn!(tool = T::NAME, "Stored props do not match tool: {}", e);
                None
            }
        }
    }
}

/// Lookup table from tool name to typed handler
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, Box<dyn ErasedTool>>,
    order: Vec<&'static str>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, compiling its parameter schema.
    ///
    /// Registering a name twice replaces the earlier tool.
    pub fn register<T: Tool>(&mut self, tool: T) -> Result<()> {
        let schema = tool.parameters_schema();
        let validator = jsonschema::validator_for(&schema).map_err(|e| {
            Error::validation(T::NAME, schema.clone(), format!("invalid schema: {}", e))
        })?;
        if self
            .tools
            .insert(
                T::NAME,
                Box::new(Registered {
                    tool,
                    schema,
                    validator,
                }),
            )
            .is_none()
        {
            self.order.push(T::NAME);
        }
        tracing::debug!(tool = T::NAME, "Registered tool");
        Ok(())
    }

    /// Validate and run a tool call
    pub async fn dispatch(
        &self,
        call: ToolInvocation,
        store: &mut StateStore,
        ui: &mut OutputChannel<UiNode>,
    ) -> Result<()> {
        let Some(tool) = self.tools.get(call.name.as_str()) else {
            return Err(Error::UnknownTool {
                name: call.name,
                arguments: call.arguments,
            });
        };
        tracing::debug!(tool = %call.name, id = %call.id, "Dispatching tool call");
        tool.invoke(call.arguments, store, ui).await
    }

    /// Tool definitions for a completion request, in registration order
    pub fn definitions(&self) -> Vec<tern_ai::Tool> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.definition())
            .collect()
    }

    /// Re-render a persisted display tag. `None` if the tool is unknown or
    /// the props no longer fit it.
    pub fn render(&self, name: &str, props: &Value) -> Option<UiNode> {
        self.tools.get(name).and_then(|t| t.render(props))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> &[&'static str] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .finish()
    }
}
