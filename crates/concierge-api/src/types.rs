//! Wire types shared by the backend services

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A normalized OAuth2 scope set.
///
/// Scopes are kept sorted and de-duplicated so that `["b", "a", "a"]` and
/// `["a", "b"]` name the same credential.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scopes(BTreeSet<String>);

impl Scopes {
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            scopes
                .into_iter()
                .map(Into::into)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        )
    }

    /// Parse a space-separated scope string
    pub fn parse(scopes: &str) -> Self {
        Self::new(scopes.split_whitespace())
    }

    /// Space-joined form used on the wire
    pub fn joined(&self) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.0.contains(scope)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl<S: Into<String>> FromIterator<S> for Scopes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// How a token was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantKind {
    ClientCredentials,
    AuthorizationCode,
}

/// An opaque bearer token plus issuance metadata
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    pub grant: GrantKind,
    pub scopes: Scopes,
    pub issued_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, grant: GrantKind, scopes: Scopes) -> Self {
        Self {
            secret: secret.into(),
            grant,
            scopes,
            issued_at: Utc::now(),
        }
    }

    /// The raw bearer value. Only collaborator clients should read this.
    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.secret)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("grant", &self.grant)
            .field("scopes", &self.scopes)
            .field("issued_at", &self.issued_at)
            .finish()
    }
}

/// A stay as a half-open date interval `[check_in, check_out)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StayDates {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayDates {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self {
            check_in,
            check_out,
        }
    }

    /// A stay must last at least one night
    pub fn is_valid(&self) -> bool {
        self.check_out > self.check_in
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Two stays overlap unless one ends on or before the day the other starts.
    /// Touching stays (one checks out the day the next checks in) do not overlap.
    pub fn overlaps(&self, other: &StayDates) -> bool {
        !(self.check_out <= other.check_in || self.check_in >= other.check_out)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: i64,
    pub name: String,
    #[serde(default, alias = "descption")]
    pub description: String,
    #[serde(default)]
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: i64,
    pub hotel_id: i64,
    pub room_number: String,
    pub room_type: String,
    pub price_per_night: f64,
    #[serde(default = "default_true")]
    pub is_available: bool,
}

fn default_true() -> bool {
    true
}

/// Query for `GET /rooms/search`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomQuery {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomSearchResult {
    pub room_id: i64,
    pub hotel_id: i64,
    pub hotel_name: String,
    #[serde(default)]
    pub hotel_rating: f64,
    #[serde(default)]
    pub hotel_description: String,
    pub room_number: String,
    pub room_type: String,
    #[serde(default)]
    pub room_type_description: String,
    pub price_per_night: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomDetails {
    pub room_id: i64,
    pub room_number: String,
    pub room_type: String,
    #[serde(default)]
    pub room_type_description: String,
    pub price_per_night: f64,
    pub total_price: f64,
    pub hotel_id: i64,
    pub hotel_name: String,
    #[serde(default)]
    pub hotel_description: String,
    #[serde(default)]
    pub hotel_rating: f64,
    pub is_available: bool,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

/// Body of `POST /bookings`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBooking {
    pub user_id: String,
    pub hotel_id: i64,
    pub room_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl NewBooking {
    pub fn stay(&self) -> StayDates {
        StayDates::new(self.check_in, self.check_out)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: i64,
    pub user_id: String,
    pub hotel_id: i64,
    #[serde(default)]
    pub hotel_name: Option<String>,
    pub room_id: i64,
    #[serde(default)]
    pub room_type: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub total_price: f64,
}

impl Booking {
    pub fn stay(&self) -> StayDates {
        StayDates::new(self.check_in, self.check_out)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDate {
    pub date: NaiveDate,
}

/// Body of `POST /calendars/primary/events`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub summary: String,
    pub start: EventDate,
    pub end: EventDate,
}

impl CalendarEvent {
    /// All-day event covering a stay. The provider treats `end` as exclusive,
    /// so the checkout day itself needs one extra day.
    pub fn for_stay(summary: impl Into<String>, stay: &StayDates) -> Self {
        let end = stay
            .check_out
            .checked_add_days(Days::new(1))
            .unwrap_or(stay.check_out);
        Self {
            summary: summary.into(),
            start: EventDate {
                date: stay.check_in,
            },
            end: EventDate { date: end },
        }
    }
}

/// What the calendar service returns for a created event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEventRef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "htmlLink")]
    pub html_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn stay(a: &str, b: &str) -> StayDates {
        StayDates::new(date(a), date(b))
    }

    #[test]
    fn test_scopes_are_sorted_and_deduplicated() {
        let a = Scopes::new(["openid", "create_bookings", "openid"]);
        let b = Scopes::parse("create_bookings  openid");
        assert_eq!(a, b);
        assert_eq!(a.joined(), "create_bookings openid");
        assert!(a.contains("openid"));
    }

    #[test]
    fn test_scopes_drop_empty_entries() {
        let s = Scopes::new(["", " read_rooms "]);
        assert_eq!(s.joined(), "read_rooms");
    }

    #[test]
    fn test_overlapping_stay_is_detected() {
        let existing = stay("2024-05-01", "2024-05-05");
        assert!(stay("2024-05-03", "2024-05-06").overlaps(&existing));
        assert!(stay("2024-04-28", "2024-05-02").overlaps(&existing));
        assert!(stay("2024-05-02", "2024-05-03").overlaps(&existing));
    }

    #[test]
    fn test_touching_stays_do_not_overlap() {
        let existing = stay("2024-05-01", "2024-05-05");
        assert!(!stay("2024-05-05", "2024-05-07").overlaps(&existing));
        assert!(!stay("2024-04-28", "2024-05-01").overlaps(&existing));
    }

    #[test]
    fn test_stay_validity() {
        assert!(stay("2024-05-01", "2024-05-03").is_valid());
        assert_eq!(stay("2024-05-01", "2024-05-03").nights(), 2);
        assert!(!stay("2024-05-03", "2024-05-03").is_valid());
    }

    #[test]
    fn test_calendar_end_is_checkout_plus_one() {
        let event = CalendarEvent::for_stay("Hotel stay", &stay("2024-05-01", "2024-05-03"));
        assert_eq!(event.start.date, date("2024-05-01"));
        assert_eq!(event.end.date, date("2024-05-04"));

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["end"]["date"], "2024-05-04");
    }

    #[test]
    fn test_access_token_debug_is_redacted() {
        let token = AccessToken::new(
            "very-secret",
            GrantKind::ClientCredentials,
            Scopes::parse("read_rooms"),
        );
        let debug = format!("{:?}", token);
        assert!(!debug.contains("very-secret"));
        assert_eq!(token.bearer(), "Bearer very-secret");
    }

    #[test]
    fn test_hotel_accepts_legacy_description_key() {
        let hotel: Hotel = serde_json::from_value(serde_json::json!({
            "id": 1,
            "name": "Gardeo Saman Villa",
            "descption": "Beachfront",
            "rating": 4.5
        }))
        .unwrap();
        assert_eq!(hotel.description, "Beachfront");
    }
}
