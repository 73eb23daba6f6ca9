//! Terminal rendering of turn output

use futures::StreamExt;
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;
use tern_agent::{ChannelEvent, ChannelHandles, Error, UiEntry, UiNode};

/// Render a UI node as terminal text. `None` for nodes with nothing to show.
pub fn render_node(node: &UiNode) -> Option<String> {
    match node {
        UiNode::Empty => None,
        UiNode::Spinner => Some("...".to_string()),
        UiNode::BotMessage { content } => Some(content.clone()),
        UiNode::UserMessage { content } => Some(format!("> {}", content)),
        UiNode::SystemMessage { content } => Some(format!("[{}]", content)),
        UiNode::BotCard { child } => render_node(child),
        UiNode::Fragment { children } => {
            let lines: Vec<String> = children.iter().filter_map(render_node).collect();
            if lines.is_empty() {
                None
            } else {
                Some(lines.join("\n"))
            }
        }
        UiNode::Component { name, props } => Some(render_component(name, props)),
    }
}

fn render_component(name: &str, props: &Value) -> String {
    let field = |obj: &Value, key: &str| obj.get(key).and_then(Value::as_str).unwrap_or("?").to_string();
    match name {
        "ListFlights" => {
            let summary = props.get("summary").unwrap_or(&Value::Null);
            format!(
                "[Flights] {} ({}) -> {} ({}) on {}",
                field(summary, "departingCity"),
                field(summary, "departingAirport"),
                field(summary, "arrivalCity"),
                field(summary, "arrivalAirport"),
                field(summary, "date"),
            )
        }
        "ListHotels" => "[Hotels] Choose a hotel to proceed to payment".to_string(),
        "PurchaseTickets" => {
            if props.get("status").and_then(Value::as_str) == Some("expired") {
                "[Checkout] Purchased".to_string()
            } else {
                "[Checkout] Review and purchase your booking (/pay)".to_string()
            }
        }
        "PaymentSucceeded" => "[Payment Succeeded] Thanks for your purchase! You will receive an email confirmation shortly.".to_string(),
        "Attachment" => {
            if props.get("isLoading").and_then(Value::as_bool).unwrap_or(false) {
                "[Attachment] Reading...".to_string()
            } else {
                "[Attachment] Done".to_string()
            }
        }
        other => format!("[{}] {}", other, props),
    }
}

/// Print a reconstructed transcript
pub fn write_transcript<W: Write>(entries: &[UiEntry], out: &mut W) -> std::io::Result<()> {
    for entry in entries {
        if let Some(text) = render_node(&entry.display) {
            writeln!(out, "{}", text)?;
        }
    }
    Ok(())
}

enum Feed {
    Text(ChannelEvent<String>),
    Ui(ChannelEvent<UiNode>),
}

/// Stream a turn to `out`: text deltas as they arrive, ui nodes on their own
/// lines. Returns the error the turn ended with, if any.
pub async fn write_turn<W: Write>(
    channels: ChannelHandles,
    out: &mut W,
) -> std::io::Result<Option<Arc<Error>>> {
    let ChannelHandles { text, ui, .. } = channels;
    let mut feed = futures::stream::select(text.map(Feed::Text), ui.map(Feed::Ui));

    let mut error = None;
    let mut mid_line = false;
    while let Some(event) = feed.next().await {
        match event {
            Feed::Text(ChannelEvent::Update(delta)) => {
                write!(out, "{}", delta)?;
                out.flush()?;
                mid_line = !delta.ends_with('\n');
            }
            Feed::Ui(ChannelEvent::Update(node)) | Feed::Ui(ChannelEvent::Done(Some(node))) => {
                if let Some(line) = render_node(&node) {
                    if mid_line {
                        writeln!(out)?;
                        mid_line = false;
                    }
                    writeln!(out, "{}", line)?;
                }
            }
            Feed::Text(ChannelEvent::Error(e)) | Feed::Ui(ChannelEvent::Error(e)) => {
                error.get_or_insert(e);
            }
            Feed::Text(ChannelEvent::Done(_)) | Feed::Ui(ChannelEvent::Done(None)) => {}
        }
    }
    if mid_line {
        writeln!(out)?;
    }
    Ok(error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tern_agent::ChannelSet;

    #[test]
    fn test_render_flights_card() {
        let node = UiNode::bot_card(UiNode::component(
            "ListFlights",
            json!({ "summary": {
                "departingCity": "London",
                "departingAirport": "LHR",
                "arrivalCity": "Paris",
                "arrivalAirport": "CDG",
                "date": "6 April, 2025"
            }}),
        ));
        assert_eq!(
            render_node(&node).unwrap(),
            "[Flights] London (LHR) -> Paris (CDG) on 6 April, 2025"
        );
    }

    #[test]
    fn test_render_purchase_cards() {
        let expired = tern_agent::purchase::expired_tickets_card();
        assert_eq!(render_node(&expired).unwrap(), "[Checkout] Purchased");
        let paid = tern_agent::purchase::payment_succeeded_card();
        assert!(render_node(&paid).unwrap().starts_with("[Payment Succeeded]"));
    }

    #[test]
    fn test_render_fragment_and_empty() {
        assert!(render_node(&UiNode::Empty).is_none());
        assert!(render_node(&UiNode::fragment(vec![UiNode::Empty])).is_none());
        let node = UiNode::fragment(vec![UiNode::system_message("One moment"), UiNode::Spinner]);
        assert_eq!(render_node(&node).unwrap(), "[One moment]\n...");
    }

    #[tokio::test]
    async fn test_write_turn_streams_text() {
        let (mut set, handles) = ChannelSet::new();
        set.ui.update(UiNode::Empty);
        set.text.update("Hi".into());
        set.text.update(" there".into());
        set.close_all(None);
        drop(set);

        let mut out = Vec::new();
        let error = write_turn(handles, &mut out).await.unwrap();
        assert!(error.is_none());
        assert_eq!(String::from_utf8(out).unwrap(), "Hi there\n");
    }

    #[tokio::test]
    async fn test_write_turn_reports_error() {
        let (mut set, handles) = ChannelSet::new();
        set.close_all(Some(Arc::new(Error::Completion("overloaded".into()))));
        drop(set);

        let mut out = Vec::new();
        let error = write_turn(handles, &mut out).await.unwrap();
        assert_eq!(error.unwrap().to_string(), "Completion failed: overloaded");
        assert!(out.is_empty());
    }
}
