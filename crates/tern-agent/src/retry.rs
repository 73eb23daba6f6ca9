//! Synthetic feedback for the second attempt of a turn.

use serde_json::Value;

use crate::error::Error;

/// Instruction appended after the error on every retry
pub const NO_APOLOGY: &str = "Do not apologize for errors";

/// What went wrong on the first attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    pub failed_tool_name: Option<String>,
    pub failed_tool_args: Option<Value>,
    pub error_message: String,
}

impl RetryContext {
    pub fn from_error(error: &Error) -> Self {
        let failed = error.failed_tool();
        Self {
            failed_tool_name: failed.map(|(name, _)| name.to_string()),
            failed_tool_args: failed.map(|(_, args)| args.clone()),
            error_message: error.to_string(),
        }
    }

    /// History entries describing the failure. Never persisted.
    pub fn messages(&self) -> Vec<tern_ai::Message> {
        let mut messages = Vec::with_capacity(3);
        if let Some(name) = &self.failed_tool_name {
            let args = self
                .failed_tool_args
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default()));
            messages.push(tern_ai::Message::assistant(format!(
                "Call '{}' with arguments: {}",
                name, args
            )));
        }
        messages.push(tern_ai::Message::user(self.error_message.clone()));
        messages.push(tern_ai::Message::user(NO_APOLOGY));
        messages
    }

    pub fn apply(&self, history: &mut Vec<tern_ai::Message>) {
        history.extend(self.messages());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tern_ai::Role;

    #[test]
    fn test_tool_failure_feedback() {
        let err = Error::validation(
            "showFlights",
            json!({ "arrivalCity": 7 }),
            "7 is not of type \"string\"",
        );
        let mut history = vec![tern_ai::Message::user("Flights to Paris")];
        RetryContext::from_error(&err).apply(&mut history);

        assert_eq!(history.len(), 4);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(
            history[1].text(),
            "Call 'showFlights' with arguments: {\"arrivalCity\":7}"
        );
        assert_eq!(history[2].role, Role::User);
        assert_eq!(history[2].text(), err.to_string());
        assert_eq!(history[3].text(), NO_APOLOGY);
    }

    #[test]
    fn test_stream_failure_feedback() {
        let ctx = RetryContext::from_error(&Error::Completion("overloaded".into()));
        assert!(ctx.failed_tool_name.is_none());

        let messages = ctx.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "Completion failed: overloaded");
        assert_eq!(messages[1].text(), NO_APOLOGY);
    }
}
