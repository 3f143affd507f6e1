//! Action catalogue: what each action needs, and what it grants.

use chrono::NaiveDate;
use concierge_api::{RoomQuery, Scopes, StayDates};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::milestones::Milestone;

/// Actions the decision layer may request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    FetchHotels,
    FetchRooms,
    SearchRooms,
    ConfirmBooking,
    Book,
    FetchBookings,
    AddToCalendar,
}

/// Which grant backs an action's credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    /// Client-credentials token for the application
    App,
    /// Token delegated by the end user
    User,
}

/// One row of the action table
#[derive(Debug)]
pub struct ActionSpec {
    pub kind: ActionKind,
    pub requires: Option<Milestone>,
    pub credential: CredentialKind,
    pub scopes: &'static [&'static str],
    /// Granted in order on success
    pub grants: &'static [Milestone],
    /// Safe to repeat after a retryable failure
    pub retry_safe: bool,
}

impl ActionSpec {
    pub fn scopes(&self) -> Scopes {
        Scopes::new(self.scopes.iter().copied())
    }
}

/// ConfirmBooking and Book share one consent
const BOOKING_SCOPES: &[&str] = &["openid", "create_bookings"];
const CALENDAR_SCOPES: &[&str] = &["openid", "calendar_events"];

/// Scopes for the app token used to read room details on behalf of a user action
pub(crate) const ROOM_DETAILS_SCOPES: &[&str] = &["read_rooms"];

/// Indexed by `ActionKind as usize`
static ACTIONS: [ActionSpec; 7] = [
    ActionSpec {
        kind: ActionKind::FetchHotels,
        requires: None,
        credential: CredentialKind::App,
        scopes: &["read_hotels"],
        grants: &[Milestone::HotelsFetched],
        retry_safe: true,
    },
    ActionSpec {
        kind: ActionKind::FetchRooms,
        requires: None,
        credential: CredentialKind::App,
        scopes: &["read_rooms"],
        grants: &[Milestone::RoomsFetched],
        retry_safe: true,
    },
    ActionSpec {
        kind: ActionKind::SearchRooms,
        requires: None,
        credential: CredentialKind::App,
        scopes: &["read_rooms"],
        grants: &[Milestone::RoomsSearched],
        retry_safe: true,
    },
    ActionSpec {
        kind: ActionKind::ConfirmBooking,
        requires: None,
        credential: CredentialKind::User,
        scopes: BOOKING_SCOPES,
        grants: &[Milestone::ConfirmationInitiated],
        retry_safe: false,
    },
    ActionSpec {
        kind: ActionKind::Book,
        requires: Some(Milestone::ConfirmationInitiated),
        credential: CredentialKind::User,
        scopes: BOOKING_SCOPES,
        grants: &[Milestone::BookingInitiated, Milestone::BookingCompleted],
        retry_safe: false,
    },
    ActionSpec {
        kind: ActionKind::FetchBookings,
        requires: None,
        credential: CredentialKind::App,
        scopes: &["read_bookings"],
        grants: &[Milestone::BookingsFetched],
        retry_safe: true,
    },
    ActionSpec {
        kind: ActionKind::AddToCalendar,
        requires: Some(Milestone::BookingCompleted),
        credential: CredentialKind::User,
        scopes: CALENDAR_SCOPES,
        grants: &[Milestone::CalendarAdded],
        retry_safe: false,
    },
];

impl ActionKind {
    pub const ALL: [ActionKind; 7] = [
        ActionKind::FetchHotels,
        ActionKind::FetchRooms,
        ActionKind::SearchRooms,
        ActionKind::ConfirmBooking,
        ActionKind::Book,
        ActionKind::FetchBookings,
        ActionKind::AddToCalendar,
    ];

    pub fn spec(self) -> &'static ActionSpec {
        &ACTIONS[self as usize]
    }

    /// Accepts `search_rooms`, `SearchRooms` or `searchRooms`
    pub fn parse(name: &str) -> Option<Self> {
        let wanted: String = name
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().replace('_', "") == wanted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::FetchHotels => "fetch_hotels",
            ActionKind::FetchRooms => "fetch_rooms",
            ActionKind::SearchRooms => "search_rooms",
            ActionKind::ConfirmBooking => "confirm_booking",
            ActionKind::Book => "book",
            ActionKind::FetchBookings => "fetch_bookings",
            ActionKind::AddToCalendar => "add_to_calendar",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Room chosen for confirmation or booking
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RoomSelection {
    /// Resolved from the room details when absent
    #[serde(default)]
    pub hotel_id: Option<i64>,
    pub room_id: i64,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl RoomSelection {
    pub fn stay(&self) -> StayDates {
        StayDates::new(self.check_in, self.check_out)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CalendarRequest {
    #[serde(default)]
    pub summary: Option<String>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Deserialize)]
struct HotelSelection {
    hotel_id: i64,
}

#[derive(Deserialize)]
struct SearchRequest {
    check_in: NaiveDate,
    check_out: NaiveDate,
    #[serde(default, alias = "location")]
    name: Option<String>,
}

/// Typed parameters for one action
#[derive(Debug, Clone, PartialEq)]
pub enum ActionParams {
    FetchHotels,
    FetchRooms { hotel_id: i64 },
    SearchRooms(RoomQuery),
    ConfirmBooking(RoomSelection),
    Book(RoomSelection),
    FetchBookings,
    AddToCalendar(CalendarRequest),
}

impl ActionParams {
    /// Parse the loosely-typed parameter object for `kind`.
    ///
    /// Errors are human-readable and go straight into `InvalidParameters`.
    pub fn parse(kind: ActionKind, value: &Value) -> Result<Self, String> {
        let params = match kind {
            ActionKind::FetchHotels => ActionParams::FetchHotels,
            ActionKind::FetchBookings => ActionParams::FetchBookings,
            ActionKind::FetchRooms => {
                let selection: HotelSelection = from_value(kind, value)?;
                ActionParams::FetchRooms {
                    hotel_id: selection.hotel_id,
                }
            }
            ActionKind::SearchRooms => {
                let search: SearchRequest = from_value(kind, value)?;
                check_stay(&StayDates::new(search.check_in, search.check_out))?;
                ActionParams::SearchRooms(RoomQuery {
                    check_in: search.check_in,
                    check_out: search.check_out,
                    name: search.name.filter(|name| !name.trim().is_empty()),
                })
            }
            ActionKind::ConfirmBooking => {
                let selection: RoomSelection = from_value(kind, value)?;
                check_stay(&selection.stay())?;
                ActionParams::ConfirmBooking(selection)
            }
            ActionKind::Book => {
                let selection: RoomSelection = from_value(kind, value)?;
                check_stay(&selection.stay())?;
                ActionParams::Book(selection)
            }
            ActionKind::AddToCalendar => {
                let request: CalendarRequest = from_value(kind, value)?;
                check_stay(&StayDates::new(request.check_in, request.check_out))?;
                ActionParams::AddToCalendar(request)
            }
        };
        Ok(params)
    }
}

fn from_value<T: DeserializeOwned>(kind: ActionKind, value: &Value) -> Result<T, String> {
    T::deserialize(value).map_err(|e| format!("Invalid parameters for {}: {}", kind, e))
}

fn check_stay(stay: &StayDates) -> Result<(), String> {
    if stay.is_valid() {
        Ok(())
    } else {
        Err(format!(
            "check_out ({}) must be after check_in ({})",
            stay.check_out, stay.check_in
        ))
    }
}
