//! Calendar service client

use super::{CalendarService, endpoint, read_json};
use crate::{
    error::Result,
    types::{AccessToken, CalendarEvent, CalendarEventRef},
};
use async_trait::async_trait;

pub struct HttpCalendarService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCalendarService {
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
impl CalendarService for HttpCalendarService {
    async fn add_event(
        &self,
        token: &AccessToken,
        event: &CalendarEvent,
    ) -> Result<CalendarEventRef> {
        let url = endpoint(&self.base_url, "calendars/primary/events");
        tracing::debug!(start = %event.start.date, end = %event.end.date, "POST {}", url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", token.bearer())
            .json(event)
            .send()
            .await?;
        read_json(response).await
    }
}
