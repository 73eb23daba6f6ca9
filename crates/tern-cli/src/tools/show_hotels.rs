//! Hotel listing tool

use async_trait::async_trait;
use serde_json::{Value, json};
use tern_agent::{Message, OutputChannel, StateStore, Tool, UiNode};

use super::NoArgs;

/// Shows hotels for the trip
pub struct ShowHotelsTool;

#[async_trait]
impl Tool for ShowHotelsTool {
    const NAME: &'static str = "showHotels";
    type Args = NoArgs;
    type Props = Value;

    fn description(&self) -> &str {
        "Show the UI to choose a hotel for the trip."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn call(
        &self,
        _args: NoArgs,
        store: &mut StateStore,
        ui: &mut OutputChannel<UiNode>,
    ) -> tern_agent::Result<()> {
        let mut next = store.get();
        next.interactions.clear();
        next.messages.push(
            Message::assistant(
                "Here's a list of hotels for you to choose from. Select one to proceed to payment.",
            )
            .with_display(Self::NAME, json!({})),
        );
        store.update(next)?;

        ui.update(self.render(json!({})));
        Ok(())
    }

    fn render(&self, _props: Value) -> UiNode {
        UiNode::bot_card(UiNode::component("ListHotels", json!({})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{Replay, call, session};
    use tern_ai::CompletionEvent;

    #[tokio::test]
    async fn test_hotels_clear_interactions() {
        let service = Replay::new(vec![
            vec![CompletionEvent::text("Lovely books."), CompletionEvent::finish()],
            vec![call("showHotels", json!({})), CompletionEvent::finish()],
        ]);
        let session = session(service);

        session.submit("I like Dune");
        session.submit("Pick a hotel");
        session.wait_idle().await;

        let state = session.state();
        assert_eq!(state.messages.len(), 4);
        let last = state.messages.last().unwrap();
        assert_eq!(last.display.as_ref().unwrap().name, "showHotels");
        assert!(state.interactions.is_empty());
        assert_eq!(
            session.ui_state()[3].display,
            UiNode::bot_card(UiNode::component("ListHotels", json!({})))
        );
    }
}
