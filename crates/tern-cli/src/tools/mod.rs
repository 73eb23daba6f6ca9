//! Travel-booking tools the assistant can call

mod checkout_booking;
mod show_flights;
mod show_hotels;

pub use checkout_booking::CheckoutBookingTool;
pub use show_flights::{FlightQuery, ShowFlightsTool};
pub use show_hotels::ShowHotelsTool;

use serde::Deserialize;
use tern_agent::ToolRegistry;

/// Arguments of a tool that takes none
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NoArgs {}

/// Registry with every travel tool
pub fn registry() -> tern_agent::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(ShowFlightsTool)?;
    registry.register(ShowHotelsTool)?;
    registry.register(CheckoutBookingTool)?;
    Ok(registry)
}
