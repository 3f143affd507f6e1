//! In-memory collaborators for tests

use async_trait::async_trait;
use concierge_api::{
    AccessToken, Booking, BookingService, CalendarEvent, CalendarEventRef, CalendarService, Error,
    Hotel, HotelInventory, IdentityProvider, NewBooking, Result, Room, RoomDetails, RoomQuery,
    RoomSearchResult, Scopes, StayDates,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::action::ActionKind;
use crate::broker::CredentialBroker;
use crate::conversation::ConversationId;
use crate::dispatcher::{ActionDispatcher, ActionRequest, DispatcherConfig, RetryConfig, Services};
use crate::milestones::{MilestoneSet, MilestoneTracker};
use crate::outcome::ActionResult;

pub(crate) const PRICE_PER_NIGHT: f64 = 99.99;
pub(crate) const TEST_USER: &str = "alice";

/// Identity provider that mints predictable tokens
pub(crate) struct FakeIdentityProvider {
    pub client_credential_calls: AtomicUsize,
    pub exchange_calls: AtomicUsize,
    delay: Option<Duration>,
    client_credentials_failure: Option<(u16, String)>,
    malformed_exchange: bool,
}

impl FakeIdentityProvider {
    /// Codes the provider refuses with `invalid_grant`
    pub const REJECTED_CODE: &'static str = "rejected-code";

    pub fn new() -> Self {
        Self {
            client_credential_calls: AtomicUsize::new(0),
            exchange_calls: AtomicUsize::new(0),
            delay: None,
            client_credentials_failure: None,
            malformed_exchange: false,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_client_credentials(mut self, status: u16, detail: &str) -> Self {
        self.client_credentials_failure = Some((status, detail.to_string()));
        self
    }

    pub fn with_malformed_exchange(mut self) -> Self {
        self.malformed_exchange = true;
        self
    }

    pub fn client_credential_calls(&self) -> usize {
        self.client_credential_calls.load(Ordering::SeqCst)
    }

    pub fn exchange_calls(&self) -> usize {
        self.exchange_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.client_credential_calls() + self.exchange_calls()
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    fn authorization_url(&self, scopes: &Scopes, nonce: &str) -> String {
        format!(
            "https://idp.test/oauth2/authorize?client_id=concierge&scope={}&response_type=code&state={}&nonce={}",
            scopes.joined().replace(' ', "+"),
            nonce,
            nonce
        )
    }

    async fn client_credentials(&self, scopes: &Scopes) -> Result<String> {
        let n = self.client_credential_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;
        if let Some((status, detail)) = &self.client_credentials_failure {
            return Err(Error::api(*status, detail.clone()));
        }
        Ok(format!("app-{}-{}", scopes.joined().replace(' ', "+"), n))
    }

    async fn exchange_code(&self, code: &str, _scopes: &Scopes) -> Result<String> {
        let n = self.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.pause().await;
        if code == Self::REJECTED_CODE {
            return Err(Error::api(400, "invalid_grant"));
        }
        if self.malformed_exchange {
            return Err(Error::MalformedToken(
                "Token response has no access_token".into(),
            ));
        }
        Ok(format!("user-{}-{}", code, n))
    }
}

/// Call counter with scripted failures and latency
#[derive(Default)]
pub(crate) struct Script {
    calls: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    failures: Mutex<VecDeque<Error>>,
}

impl Script {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Fail the next call with `error`. Queued failures are used in order.
    pub fn fail_next(&self, error: Error) {
        self.failures.lock().push_back(error);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    async fn begin(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().pop_front();
        match failure {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub(crate) struct FakeInventory {
    pub script: Script,
}

#[async_trait]
impl HotelInventory for FakeInventory {
    async fn hotels(&self, _token: &AccessToken) -> Result<Vec<Hotel>> {
        self.script.begin().await?;
        Ok(vec![
            Hotel {
                id: 1,
                name: "Gardeo Saman Villa".into(),
                description: "Beachfront villas".into(),
                rating: 4.8,
            },
            Hotel {
                id: 2,
                name: "Gardeo Colombo Seven".into(),
                description: "City hotel".into(),
                rating: 4.5,
            },
        ])
    }

    async fn hotel_rooms(&self, _token: &AccessToken, hotel_id: i64) -> Result<Vec<Room>> {
        self.script.begin().await?;
        Ok(vec![Room {
            id: 7,
            hotel_id,
            room_number: "101".into(),
            room_type: "Deluxe".into(),
            price_per_night: PRICE_PER_NIGHT,
            is_available: true,
        }])
    }

    async fn search_rooms(
        &self,
        _token: &AccessToken,
        _query: &RoomQuery,
    ) -> Result<Vec<RoomSearchResult>> {
        self.script.begin().await?;
        Ok(vec![RoomSearchResult {
            room_id: 7,
            hotel_id: 1,
            hotel_name: "Gardeo Saman Villa".into(),
            hotel_rating: 4.8,
            hotel_description: "Beachfront villas".into(),
            room_number: "101".into(),
            room_type: "Deluxe".into(),
            room_type_description: "Sea view".into(),
            price_per_night: PRICE_PER_NIGHT,
        }])
    }

    async fn room_details(
        &self,
        _token: &AccessToken,
        room_id: i64,
        stay: &StayDates,
    ) -> Result<RoomDetails> {
        self.script.begin().await?;
        Ok(RoomDetails {
            room_id,
            room_number: "101".into(),
            room_type: "Deluxe".into(),
            room_type_description: "Sea view".into(),
            price_per_night: PRICE_PER_NIGHT,
            total_price: PRICE_PER_NIGHT * stay.nights() as f64,
            hotel_id: 1,
            hotel_name: "Gardeo Saman Villa".into(),
            hotel_description: "Beachfront villas".into(),
            hotel_rating: 4.8,
            is_available: true,
            check_in: stay.check_in,
            check_out: stay.check_out,
        })
    }
}

/// Booking service that enforces the overlap rule like the real one
#[derive(Default)]
pub(crate) struct InMemoryBookingService {
    pub script: Script,
    bookings: Mutex<Vec<Booking>>,
}

impl InMemoryBookingService {
    pub fn stored(&self) -> Vec<Booking> {
        self.bookings.lock().clone()
    }
}

#[async_trait]
impl BookingService for InMemoryBookingService {
    async fn create_booking(&self, _token: &AccessToken, booking: &NewBooking) -> Result<Booking> {
        self.script.begin().await?;
        let mut bookings = self.bookings.lock();
        let stay = booking.stay();
        let taken = bookings.iter().any(|existing| {
            existing.hotel_id == booking.hotel_id
                && existing.room_id == booking.room_id
                && existing.stay().overlaps(&stay)
        });
        if taken {
            return Err(Error::api(
                409,
                "Room is already booked for the selected dates",
            ));
        }
        let created = Booking {
            id: bookings.len() as i64 + 1,
            user_id: booking.user_id.clone(),
            hotel_id: booking.hotel_id,
            hotel_name: None,
            room_id: booking.room_id,
            room_type: None,
            check_in: booking.check_in,
            check_out: booking.check_out,
            total_price: PRICE_PER_NIGHT * stay.nights() as f64,
        };
        bookings.push(created.clone());
        Ok(created)
    }

    async fn user_bookings(&self, _token: &AccessToken, user_id: &str) -> Result<Vec<Booking>> {
        self.script.begin().await?;
        Ok(self
            .bookings
            .lock()
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct FakeCalendar {
    pub script: Script,
    events: Mutex<Vec<CalendarEvent>>,
}

impl FakeCalendar {
    pub fn recorded(&self) -> Vec<CalendarEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl CalendarService for FakeCalendar {
    async fn add_event(
        &self,
        _token: &AccessToken,
        event: &CalendarEvent,
    ) -> Result<CalendarEventRef> {
        self.script.begin().await?;
        let mut events = self.events.lock();
        events.push(event.clone());
        let id = format!("evt-{}", events.len());
        Ok(CalendarEventRef {
            html_link: Some(format!("https://calendar.test/{}", id)),
            id: Some(id),
        })
    }
}

/// A dispatcher wired to fakes, acting for [`TEST_USER`]
pub(crate) struct Harness {
    pub identity: Arc<FakeIdentityProvider>,
    pub inventory: Arc<FakeInventory>,
    pub bookings: Arc<InMemoryBookingService>,
    pub calendar: Arc<FakeCalendar>,
    pub dispatcher: ActionDispatcher,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakeIdentityProvider::new(), test_config())
    }

    pub fn with_config(config: DispatcherConfig) -> Self {
        Self::build(FakeIdentityProvider::new(), config)
    }

    pub fn with_retry(read_retry: RetryConfig) -> Self {
        Self::with_config(DispatcherConfig {
            read_retry,
            ..test_config()
        })
    }

    pub fn with_identity(identity: FakeIdentityProvider) -> Self {
        Self::build(identity, test_config())
    }

    fn build(identity: FakeIdentityProvider, config: DispatcherConfig) -> Self {
        let identity = Arc::new(identity);
        let inventory = Arc::new(FakeInventory::default());
        let bookings = Arc::new(InMemoryBookingService::default());
        let calendar = Arc::new(FakeCalendar::default());
        let broker = CredentialBroker::new(Arc::clone(&identity) as Arc<dyn IdentityProvider>);
        let services = Services {
            inventory: Arc::clone(&inventory) as Arc<dyn HotelInventory>,
            bookings: Arc::clone(&bookings) as Arc<dyn BookingService>,
            calendar: Arc::clone(&calendar) as Arc<dyn CalendarService>,
        };
        let dispatcher =
            ActionDispatcher::new(broker, Arc::new(MilestoneTracker::new()), services, config);
        Self {
            identity,
            inventory,
            bookings,
            calendar,
            dispatcher,
        }
    }

    pub fn request(&self, conversation: &str, action: ActionKind, params: Value) -> ActionRequest {
        ActionRequest {
            conversation: ConversationId::new(conversation),
            action,
            params,
            user_id: TEST_USER.to_string(),
        }
    }

    pub async fn dispatch(
        &self,
        conversation: &str,
        action: ActionKind,
        params: Value,
    ) -> ActionResult {
        let request = self.request(conversation, action, params);
        self.dispatcher
            .dispatch(&request, &CancellationToken::new())
            .await
    }

    /// Complete the pending challenge for `action`'s scopes
    pub async fn authorize(&self, action: ActionKind) {
        self.dispatcher
            .complete_authorization(
                TEST_USER,
                &action.spec().scopes(),
                "consent-code",
                &CancellationToken::new(),
            )
            .await
            .unwrap();
    }

    pub fn snapshot(&self, conversation: &str) -> MilestoneSet {
        self.dispatcher.snapshot(&ConversationId::new(conversation))
    }
}

fn test_config() -> DispatcherConfig {
    DispatcherConfig {
        call_timeout: Duration::from_secs(2),
        read_retry: RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        },
        ..DispatcherConfig::default()
    }
}
