//! Booking service client

use super::{BookingService, endpoint, read_json};
use crate::{
    error::Result,
    types::{AccessToken, Booking, NewBooking},
};
use async_trait::async_trait;

pub struct HttpBookingService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBookingService {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BookingService for HttpBookingService {
    async fn create_booking(&self, token: &AccessToken, booking: &NewBooking) -> Result<Booking> {
        let url = endpoint(&self.base_url, "bookings");
        tracing::debug!(
            hotel_id = booking.hotel_id,
            room_id = booking.room_id,
            "POST {}",
            url
        );
        let response = self
            .client
            .post(&url)
            .header("Authorization", token.bearer())
            .json(booking)
            .send()
            .await?;
        read_json(response).await
    }

    async fn user_bookings(&self, token: &AccessToken, user_id: &str) -> Result<Vec<Booking>> {
        let url = endpoint(
            &self.base_url,
            &format!("users/{}/bookings", urlencoding::encode(user_id)),
        );
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", token.bearer())
            .send()
            .await?;
        read_json(response).await
    }
}
