//! Hotel inventory service client

use super::{HotelInventory, endpoint, read_json};
use crate::{
    error::Result,
    types::{AccessToken, Hotel, Room, RoomDetails, RoomQuery, RoomSearchResult, StayDates},
};
use async_trait::async_trait;

pub struct HttpHotelInventory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpHotelInventory {
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
impl HotelInventory for HttpHotelInventory {
    async fn hotels(&self, token: &AccessToken) -> Result<Vec<Hotel>> {
        let url = endpoint(&self.base_url, "hotels");
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", token.bearer())
            .send()
            .await?;
        read_json(response).await
    }

    async fn hotel_rooms(&self, token: &AccessToken, hotel_id: i64) -> Result<Vec<Room>> {
        let url = endpoint(&self.base_url, &format!("hotels/{}/rooms", hotel_id));
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", token.bearer())
            .send()
            .await?;
        read_json(response).await
    }

    async fn search_rooms(
        &self,
        token: &AccessToken,
        query: &RoomQuery,
    ) -> Result<Vec<RoomSearchResult>> {
        let url = endpoint(&self.base_url, "rooms/search");
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", token.bearer())
            .query(query)
            .send()
            .await?;
        read_json(response).await
    }

    async fn room_details(
        &self,
        token: &AccessToken,
        room_id: i64,
        stay: &StayDates,
    ) -> Result<RoomDetails> {
        let url = endpoint(&self.base_url, &format!("rooms/{}/details", room_id));
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", token.bearer())
            .query(stay)
            .send()
            .await?;
        read_json(response).await
    }
}
