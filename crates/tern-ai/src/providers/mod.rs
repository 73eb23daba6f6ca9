//! Completion service implementations

pub mod anthropic;

use crate::{CompletionEventStream, CompletionRequest, Error, Result};
use async_trait::async_trait;

/// A service that turns a prompt history into a stream of completion events
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Start a streamed completion
    async fn stream(&self, request: &CompletionRequest) -> Result<CompletionEventStream>;
}

/// Get an API key from the provided value or the environment
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = provided {
        return Ok(key.to_string());
    }

    std::env::var(env_var).map_err(|_| Error::InvalidApiKey)
}
