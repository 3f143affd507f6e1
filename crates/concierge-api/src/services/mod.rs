//! Backend service interfaces and their HTTP implementations

pub mod booking;
pub mod calendar;
pub mod identity;
pub mod inventory;

use crate::{
    error::{Error, Result},
    types::{
        AccessToken, Booking, CalendarEvent, CalendarEventRef, Hotel, NewBooking, Room,
        RoomDetails, RoomQuery, RoomSearchResult, Scopes, StayDates,
    },
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;

pub use booking::HttpBookingService;
pub use calendar::HttpCalendarService;
pub use identity::{OAuthClient, OAuthSettings};
pub use inventory::HttpHotelInventory;

/// OAuth2 identity provider (authorize + token endpoints)
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Build the URL the end user must visit to grant consent
    fn authorization_url(&self, scopes: &Scopes, nonce: &str) -> String;

    /// Client-credentials grant. Returns the raw access token.
    async fn client_credentials(&self, scopes: &Scopes) -> Result<String>;

    /// Authorization-code grant. Returns the raw access token.
    async fn exchange_code(&self, code: &str, scopes: &Scopes) -> Result<String>;
}

/// Hotel inventory: hotels, rooms, availability and pricing
#[async_trait]
pub trait HotelInventory: Send + Sync {
    async fn hotels(&self, token: &AccessToken) -> Result<Vec<Hotel>>;

    async fn hotel_rooms(&self, token: &AccessToken, hotel_id: i64) -> Result<Vec<Room>>;

    async fn search_rooms(
        &self,
        token: &AccessToken,
        query: &RoomQuery,
    ) -> Result<Vec<RoomSearchResult>>;

    async fn room_details(
        &self,
        token: &AccessToken,
        room_id: i64,
        stay: &StayDates,
    ) -> Result<RoomDetails>;
}

/// Booking service. Must reject stays that overlap an existing booking of
/// the same hotel room (see [`StayDates::overlaps`]).
#[async_trait]
pub trait BookingService: Send + Sync {
    async fn create_booking(&self, token: &AccessToken, booking: &NewBooking) -> Result<Booking>;

    async fn user_bookings(&self, token: &AccessToken, user_id: &str) -> Result<Vec<Booking>>;
}

/// User calendar
#[async_trait]
pub trait CalendarService: Send + Sync {
    async fn add_event(
        &self,
        token: &AccessToken,
        event: &CalendarEvent,
    ) -> Result<CalendarEventRef>;
}

/// Join a base URL and a path without doubling or dropping the slash
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Pull a human-readable message out of an error body.
///
/// Services answer with `{"detail": ...}`, the token endpoint with
/// `{"error": ..., "error_description": ...}`. Anything else is passed through.
pub(crate) fn error_detail(body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["detail", "error_description", "error", "message"] {
            if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
                return text.to_string();
            }
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        "Unknown error".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Turn a response into a typed body, or an [`Error::Api`] carrying the service's detail
pub(crate) async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::api(status.as_u16(), error_detail(&body)));
    }
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_slashes() {
        assert_eq!(
            endpoint("http://localhost:8001/", "/rooms/search"),
            "http://localhost:8001/rooms/search"
        );
        assert_eq!(
            endpoint("http://localhost:8001", "hotels"),
            "http://localhost:8001/hotels"
        );
    }

    #[test]
    fn test_error_detail_prefers_detail_field() {
        assert_eq!(
            error_detail(r#"{"detail": "Room is already booked for the selected dates"}"#),
            "Room is already booked for the selected dates"
        );
    }

    #[test]
    fn test_error_detail_reads_oauth_errors() {
        assert_eq!(
            error_detail(r#"{"error": "invalid_grant", "error_description": "Code expired"}"#),
            "Code expired"
        );
        assert_eq!(error_detail(r#"{"error": "invalid_client"}"#), "invalid_client");
    }

    #[test]
    fn test_error_detail_falls_back_to_body() {
        assert_eq!(error_detail("Bad Gateway"), "Bad Gateway");
        assert_eq!(error_detail("   "), "Unknown error");
    }
}
