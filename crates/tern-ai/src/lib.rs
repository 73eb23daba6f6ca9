//! tern-ai: completion service abstraction
//!
//! Prompt types, the typed completion event stream, and the providers that
//! produce it.

pub mod error;
pub mod models;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use providers::CompletionService;
pub use stream::{CompletionEvent, CompletionEventStream};
pub use types::*;
