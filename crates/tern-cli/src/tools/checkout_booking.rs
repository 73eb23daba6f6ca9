//! Checkout tool

use async_trait::async_trait;
use serde_json::{Value, json};
use tern_agent::{OutputChannel, StateStore, Tool, UiNode};

use super::NoArgs;

/// Shows the purchase form for the chosen flight and hotel
pub struct CheckoutBookingTool;

#[async_trait]
impl Tool for CheckoutBookingTool {
    const NAME: &'static str = "checkoutBooking";
    type Args = NoArgs;
    type Props = Value;

    fn description(&self) -> &str {
        "Show the UI to purchase/checkout a flight and hotel booking."
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
        store.update(next)?;

        ui.update(self.render(json!({})));
        Ok(())
    }

    fn render(&self, props: Value) -> UiNode {
        UiNode::bot_card(UiNode::component("PurchaseTickets", props))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testing::{Replay, call, session};
    use tern_ai::CompletionEvent;

    #[tokio::test]
    async fn test_checkout_shows_purchase_card() {
        let service = Replay::new(vec![vec![
            call("checkoutBooking", json!({})),
            CompletionEvent::text("Ready when you are."),
            CompletionEvent::finish(),
        ]]);
        let session = session(service);

        let handle = session.submit("Book it");
        let ui = handle.channels.ui.latest().await.unwrap();
        assert_eq!(
            ui,
            Some(UiNode::bot_card(UiNode::component("PurchaseTickets", json!({}))))
        );
        session.wait_idle().await;

        let texts: Vec<String> = session.state().messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["Book it", "Ready when you are."]);
    }
}
