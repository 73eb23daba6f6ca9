//! Payment confirmation that follows checkout.
//!
//! Both steps run without the completion service: they append a fixed
//! assistant message so the model sees where the purchase stands on the next
//! turn.

use serde_json::json;

use crate::ui::UiNode;

/// Appended when a confirmation code is requested
pub const CODE_SENT: &str =
    "A code has been sent to user's phone. They should enter it in the user interface to continue.";

/// Appended once the code is accepted; re-rendered as an expired checkout card
pub const PURCHASE_COMPLETED: &str = "The purchase has completed successfully.";

pub const FULFILLMENT_NOTICE: &str = "Please wait while we fulfill your order.";

/// Shown while the order is being fulfilled
pub fn fulfillment_card() -> UiNode {
    UiNode::fragment(vec![
        UiNode::Spinner,
        UiNode::system_message(FULFILLMENT_NOTICE),
    ])
}

pub fn payment_succeeded_card() -> UiNode {
    UiNode::bot_card(UiNode::component("PaymentSucceeded", json!({})))
}

/// Checkout card of a purchase that already went through
pub fn expired_tickets_card() -> UiNode {
    UiNode::bot_card(UiNode::component(
        "PurchaseTickets",
        json!({ "status": "expired" }),
    ))
}
