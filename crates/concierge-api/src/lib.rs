//! concierge-api: typed access to the services behind the booking flow
//!
//! This crate defines the collaborator interfaces the dispatcher talks to
//! (identity provider, hotel inventory, bookings, calendar), the wire types
//! they exchange, and reqwest-backed HTTP implementations of each.

pub mod error;
pub mod services;
pub mod types;

pub use error::{Error, Result};
pub use services::{BookingService, CalendarService, HotelInventory, IdentityProvider};
pub use types::*;
