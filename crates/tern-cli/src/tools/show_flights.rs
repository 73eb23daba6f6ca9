//! Flight listing tool

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tern_agent::{Message, OutputChannel, StateStore, Tool, UiNode};

/// What the user asked to fly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightQuery {
    pub departing_city: String,
    pub arrival_city: String,
    pub departing_airport: String,
    pub arrival_airport: String,
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightProps {
    pub summary: FlightQuery,
}

/// Shows flights matching the user's query
pub struct ShowFlightsTool;

#[async_trait]
impl Tool for ShowFlightsTool {
    const NAME: &'static str = "showFlights";
    type Args = FlightQuery;
    type Props = FlightProps;

    fn description(&self) -> &str {
        "List available flights in the UI. List 3 that match user's query."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "departingCity": { "type": "string" },
                "arrivalCity": { "type": "string" },
                "departingAirport": {
                    "type": "string",
                    "description": "Departing airport code"
                },
                "arrivalAirport": {
                    "type": "string",
                    "description": "Arrival airport code"
                },
                "date": {
                    "type": "string",
                    "description": "Date of the user's flight, example format: 6 April, 1998"
                }
            },
            "required": ["departingCity", "arrivalCity", "departingAirport", "arrivalAirport", "date"]
        })
    }

    async fn call(
        &self,
        args: FlightQuery,
        store: &mut StateStore,
        ui: &mut OutputChannel<UiNode>,
    ) -> tern_agent::Result<()> {
        tracing::info!(from = %args.departing_airport, to = %args.arrival_airport, "Showing flights");
        let props = FlightProps { summary: args };

        let mut next = store.get();
        next.interactions.clear();
        next.messages.push(
            Message::assistant(
                "Here's a list of flights for you. Choose one and we can proceed to pick a seat.",
            )
            .with_display(Self::NAME, json!(props)),
        );
        store.update(next)?;

        ui.update(self.render(props));
        Ok(())
    }

    fn render(&self, props: FlightProps) -> UiNode {
        UiNode::bot_card(UiNode::component(
            "ListFlights",
            json!({ "summary": props.summary }),
        ))
    }
}
