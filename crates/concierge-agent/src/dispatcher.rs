//! Milestone-gated action dispatcher

use concierge_api::{
    AccessToken, BookingService, CalendarEvent, CalendarService, HotelInventory, NewBooking,
    Scopes, StayDates,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::action::{ActionKind, ActionParams, ActionSpec, CredentialKind, ROOM_DETAILS_SCOPES};
use crate::broker::{CredentialBroker, CredentialKey, UserCredential};
use crate::conversation::{ConversationId, Identity};
use crate::error::CredentialError;
use crate::events::DispatchEvent;
use crate::milestones::{MilestoneSet, MilestoneTracker};
use crate::outcome::{ActionPayload, ActionResult};

/// Backend collaborators the dispatcher calls
#[derive(Clone)]
pub struct Services {
    pub inventory: Arc<dyn HotelInventory>,
    pub bookings: Arc<dyn BookingService>,
    pub calendar: Arc<dyn CalendarService>,
}

/// Retry configuration for read actions
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound for each collaborator or token-endpoint call
    pub call_timeout: Duration,
    pub read_retry: RetryConfig,
    /// Calendar title when the request does not name one
    pub calendar_summary: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(30),
            read_retry: RetryConfig::default(),
            calendar_summary: "Hotel stay".to_string(),
        }
    }
}

/// One action requested by the decision layer
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub conversation: ConversationId,
    pub action: ActionKind,
    pub params: serde_json::Value,
    /// End user on whose behalf user-delegated actions run
    pub user_id: String,
}

/// A token together with the cache key it was issued under
struct Credential {
    key: CredentialKey,
    token: AccessToken,
}

enum CallFailure {
    Service {
        error: concierge_api::Error,
        credential: CredentialKey,
    },
    Credential(CredentialError),
    TimedOut,
    Cancelled,
}

impl CallFailure {
    fn is_retryable(&self) -> bool {
        match self {
            CallFailure::Service { error, .. } => error.is_retryable(),
            CallFailure::Credential(e) => e.is_retryable(),
            CallFailure::TimedOut => true,
            CallFailure::Cancelled => false,
        }
    }
}

/// Validates preconditions, obtains credentials, calls collaborators, and
/// records milestones. One instance serves every conversation.
pub struct ActionDispatcher {
    broker: CredentialBroker,
    tracker: Arc<MilestoneTracker>,
    services: Services,
    config: DispatcherConfig,
    event_tx: broadcast::Sender<DispatchEvent>,
}

impl ActionDispatcher {
    pub fn new(
        broker: CredentialBroker,
        tracker: Arc<MilestoneTracker>,
        services: Services,
        config: DispatcherConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            broker,
            tracker,
            services,
            config,
            event_tx,
        }
    }

    /// Subscribe to dispatch events
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.event_tx.subscribe()
    }

    pub fn broker(&self) -> &CredentialBroker {
        &self.broker
    }

    pub fn tracker(&self) -> &MilestoneTracker {
        &self.tracker
    }

    pub fn snapshot(&self, conversation: &ConversationId) -> MilestoneSet {
        self.tracker.snapshot(conversation)
    }

    fn emit(&self, event: DispatchEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Run one action. Never fails: every outcome is an [`ActionResult`].
    ///
    /// Milestones are only granted after the collaborator call succeeded.
    /// Cancelling `cancel` or hitting the call timeout leaves the
    /// conversation's milestones untouched.
    pub async fn dispatch(
        &self,
        request: &ActionRequest,
        cancel: &CancellationToken,
    ) -> ActionResult {
        let spec = request.action.spec();
        let conversation = &request.conversation;
        self.emit(DispatchEvent::ActionStart {
            conversation: conversation.clone(),
            action: request.action,
        });

        if let Some(required) = spec.requires.filter(|m| !self.tracker.has(conversation, *m)) {
            tracing::info!(
                conversation = %conversation,
                action = %request.action,
                missing = required.as_str(),
                "Action rejected: precondition not met"
            );
            self.emit(DispatchEvent::PreconditionFailed {
                conversation: conversation.clone(),
                action: request.action,
                missing: required,
            });
            return ActionResult::PreconditionFailed { missing: required };
        }

        let params = match ActionParams::parse(request.action, &request.params) {
            Ok(params) => params,
            Err(detail) => {
                return self.failed(request, ActionResult::InvalidParameters { detail });
            }
        };

        let credential = match self.credential(spec, &request.user_id, cancel).await {
            Ok(credential) => credential,
            Err(result) => return self.failed(request, result),
        };

        let mut attempt = 0;
        let outcome = loop {
            match self.call(&params, &credential, &request.user_id, cancel).await {
                Ok(payload) => break Ok(payload),
                Err(failure)
                    if spec.retry_safe
                        && failure.is_retryable()
                        && attempt < self.config.read_retry.max_retries =>
                {
                    let delay = self.config.read_retry.delay_for_attempt(attempt);
                    attempt += 1;
                    tracing::debug!(
                        conversation = %conversation,
                        action = %request.action,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying read action"
                    );
                    self.emit(DispatchEvent::RetryScheduled {
                        conversation: conversation.clone(),
                        action: request.action,
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                    });
                    tokio::select! {
                        _ = cancel.cancelled() => break Err(CallFailure::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(failure) => break Err(failure),
            }
        };

        match outcome {
            Ok(payload) => {
                for milestone in self.tracker.achieve_all(conversation, spec.grants) {
                    self.emit(DispatchEvent::MilestoneAchieved {
                        conversation: conversation.clone(),
                        milestone,
                    });
                }
                tracing::info!(
                    conversation = %conversation,
                    action = %request.action,
                    "Action completed"
                );
                self.emit(DispatchEvent::ActionEnd {
                    conversation: conversation.clone(),
                    action: request.action,
                });
                ActionResult::Ok(payload)
            }
            Err(failure) => {
                let result = self.resolve_failure(failure);
                self.failed(request, result)
            }
        }
    }

    /// Log and announce a non-`Ok` result
    fn failed(&self, request: &ActionRequest, result: ActionResult) -> ActionResult {
        let conversation = request.conversation.clone();
        match &result {
            ActionResult::AuthorizationRequired { .. } => {
                tracing::info!(
                    conversation = %conversation,
                    action = %request.action,
                    "Action needs user authorization"
                );
                self.emit(DispatchEvent::AuthorizationRequired {
                    conversation,
                    action: request.action,
                });
            }
            other => {
                let detail = other.error_detail().unwrap_or_default();
                tracing::warn!(
                    conversation = %conversation,
                    action = %request.action,
                    detail = %detail,
                    "Action failed"
                );
                self.emit(DispatchEvent::ActionFailed {
                    conversation,
                    action: request.action,
                    detail,
                });
            }
        }
        result
    }

    async fn credential(
        &self,
        spec: &ActionSpec,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Credential, ActionResult> {
        let scopes = spec.scopes();
        match spec.credential {
            CredentialKind::App => self
                .app_credential(scopes, cancel)
                .await
                .map_err(|failure| self.resolve_failure(failure)),
            CredentialKind::User => match self.broker.user_token(user_id, &scopes) {
                UserCredential::Ready(token) => Ok(Credential {
                    key: CredentialKey::user(user_id, scopes),
                    token,
                }),
                UserCredential::AuthorizationRequired { url } => {
                    Err(ActionResult::AuthorizationRequired { url })
                }
            },
        }
    }

    async fn app_credential(
        &self,
        scopes: Scopes,
        cancel: &CancellationToken,
    ) -> Result<Credential, CallFailure> {
        let token = self
            .guarded(cancel, self.broker.app_token(&scopes))
            .await?
            .map_err(CallFailure::Credential)?;
        Ok(Credential {
            key: CredentialKey::machine(scopes),
            token,
        })
    }

    /// Bound a future by the caller's cancellation and the call timeout
    async fn guarded<T>(
        &self,
        cancel: &CancellationToken,
        call: impl Future<Output = T>,
    ) -> Result<T, CallFailure> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CallFailure::Cancelled),
            result = tokio::time::timeout(self.config.call_timeout, call) => {
                result.map_err(|_| CallFailure::TimedOut)
            }
        }
    }

    /// A collaborator call made with `credential`
    async fn service<T>(
        &self,
        cancel: &CancellationToken,
        credential: &Credential,
        call: impl Future<Output = concierge_api::Result<T>>,
    ) -> Result<T, CallFailure> {
        self.guarded(cancel, call)
            .await?
            .map_err(|error| CallFailure::Service {
                error,
                credential: credential.key.clone(),
            })
    }

    async fn call(
        &self,
        params: &ActionParams,
        credential: &Credential,
        user_id: &str,
        cancel: &CancellationToken,
    ) -> Result<ActionPayload, CallFailure> {
        let token = &credential.token;
        let inventory = &self.services.inventory;
        match params {
            ActionParams::FetchHotels => {
                let hotels = self
                    .service(cancel, credential, inventory.hotels(token))
                    .await?;
                let listed: Vec<_> = hotels
                    .iter()
                    .map(|h| {
                        json!({
                            "id": h.id,
                            "name": h.name,
                            "description": h.description,
                            "rating": h.rating,
                        })
                    })
                    .collect();
                Ok(ActionPayload {
                    message: format!("Found {} hotels", hotels.len()),
                    user_facing: json!({ "hotels": listed }),
                    raw: json!(hotels),
                })
            }
            ActionParams::FetchRooms { hotel_id } => {
                let rooms = self
                    .service(cancel, credential, inventory.hotel_rooms(token, *hotel_id))
                    .await?;
                let listed: Vec<_> = rooms
                    .iter()
                    .map(|r| {
                        json!({
                            "room_id": r.id,
                            "room_number": r.room_number,
                            "room_type": r.room_type,
                            "price_per_night": r.price_per_night,
                            "is_available": r.is_available,
                        })
                    })
                    .collect();
                Ok(ActionPayload {
                    message: format!("Hotel {} has {} rooms", hotel_id, rooms.len()),
                    user_facing: json!({ "hotel_id": hotel_id, "rooms": listed }),
                    raw: json!(rooms),
                })
            }
            ActionParams::SearchRooms(query) => {
                let rooms = self
                    .service(cancel, credential, inventory.search_rooms(token, query))
                    .await?;
                let listed: Vec<_> = rooms
                    .iter()
                    .map(|r| {
                        json!({
                            "room_id": r.room_id,
                            "hotel_id": r.hotel_id,
                            "hotel_name": r.hotel_name,
                            "hotel_rating": r.hotel_rating,
                            "room_number": r.room_number,
                            "room_type": r.room_type,
                            "price_per_night": r.price_per_night,
                        })
                    })
                    .collect();
                Ok(ActionPayload {
                    message: format!("Found {} available rooms", rooms.len()),
                    user_facing: json!({
                        "check_in": query.check_in,
                        "check_out": query.check_out,
                        "rooms": listed,
                    }),
                    raw: json!(rooms),
                })
            }
            ActionParams::ConfirmBooking(selection) => {
                let app = self.room_details_credential(cancel).await?;
                let details = self
                    .service(
                        cancel,
                        &app,
                        inventory.room_details(&app.token, selection.room_id, &selection.stay()),
                    )
                    .await?;
                Ok(ActionPayload {
                    message: format!(
                        "Please confirm room {} at {} from {} to {}",
                        details.room_number, details.hotel_name, details.check_in, details.check_out
                    ),
                    user_facing: json!({
                        "room_id": details.room_id,
                        "room_number": details.room_number,
                        "room_type": details.room_type,
                        "room_type_description": details.room_type_description,
                        "price_per_night": details.price_per_night,
                        "total_price": details.total_price,
                        "hotel_id": details.hotel_id,
                        "hotel_name": details.hotel_name,
                        "hotel_description": details.hotel_description,
                        "hotel_rating": details.hotel_rating,
                        "is_available": details.is_available,
                        "check_in": details.check_in,
                        "check_out": details.check_out,
                    }),
                    raw: json!(details),
                })
            }
            ActionParams::Book(selection) => {
                let hotel_id = match selection.hotel_id {
                    Some(hotel_id) => hotel_id,
                    None => {
                        let app = self.room_details_credential(cancel).await?;
                        self.service(
                            cancel,
                            &app,
                            inventory.room_details(
                                &app.token,
                                selection.room_id,
                                &selection.stay(),
                            ),
                        )
                        .await?
                        .hotel_id
                    }
                };
                let new_booking = NewBooking {
                    user_id: user_id.to_string(),
                    hotel_id,
                    room_id: selection.room_id,
                    check_in: selection.check_in,
                    check_out: selection.check_out,
                };
                let booking = self
                    .service(
                        cancel,
                        credential,
                        self.services.bookings.create_booking(token, &new_booking),
                    )
                    .await?;
                Ok(ActionPayload {
                    message: format!(
                        "Room successfully booked at hotel {} for dates {} to {}",
                        hotel_id, selection.check_in, selection.check_out
                    ),
                    user_facing: json!({
                        "booking_id": booking.id,
                        "total_price": booking.total_price,
                        "status": "confirmed",
                    }),
                    raw: json!(booking),
                })
            }
            ActionParams::FetchBookings => {
                let bookings = self
                    .service(
                        cancel,
                        credential,
                        self.services.bookings.user_bookings(token, user_id),
                    )
                    .await?;
                let listed: Vec<_> = bookings
                    .iter()
                    .map(|b| {
                        json!({
                            "booking_id": b.id,
                            "hotel_id": b.hotel_id,
                            "hotel_name": b.hotel_name,
                            "room_id": b.room_id,
                            "room_type": b.room_type,
                            "check_in": b.check_in,
                            "check_out": b.check_out,
                            "total_price": b.total_price,
                        })
                    })
                    .collect();
                Ok(ActionPayload {
                    message: format!("Found {} bookings", bookings.len()),
                    user_facing: json!({ "bookings": listed }),
                    raw: json!(bookings),
                })
            }
            ActionParams::AddToCalendar(request) => {
                let summary = request
                    .summary
                    .clone()
                    .unwrap_or_else(|| self.config.calendar_summary.clone());
                let stay = StayDates::new(request.check_in, request.check_out);
                let event = CalendarEvent::for_stay(summary, &stay);
                let created = self
                    .service(
                        cancel,
                        credential,
                        self.services.calendar.add_event(token, &event),
                    )
                    .await?;
                Ok(ActionPayload {
                    message: format!("Added '{}' to your calendar", event.summary),
                    user_facing: json!({
                        "summary": event.summary,
                        "start": event.start.date,
                        "end": event.end.date,
                        "link": created.html_link,
                    }),
                    raw: json!(created),
                })
            }
        }
    }

    async fn room_details_credential(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Credential, CallFailure> {
        self.app_credential(Scopes::new(ROOM_DETAILS_SCOPES.iter().copied()), cancel)
            .await
    }

    /// Map a failed call to the outcome the caller sees.
    ///
    /// A 401 evicts the rejected token. For user tokens the caller gets a
    /// fresh challenge. For app tokens the next attempt fetches a new one.
    fn resolve_failure(&self, failure: CallFailure) -> ActionResult {
        match failure {
            CallFailure::Service { error, credential } if error.is_unauthorized() => {
                self.broker
                    .invalidate(&credential.identity, &credential.scopes);
                match &credential.identity {
                    Identity::User(user_id) => {
                        match self.broker.user_token(user_id, &credential.scopes) {
                            UserCredential::AuthorizationRequired { url } => {
                                ActionResult::AuthorizationRequired { url }
                            }
                            UserCredential::Ready(_) => ActionResult::upstream(error.detail(), true),
                        }
                    }
                    Identity::Machine => ActionResult::upstream(error.detail(), true),
                }
            }
            CallFailure::Service { error, .. } => {
                ActionResult::upstream(error.detail(), error.is_retryable())
            }
            CallFailure::Credential(CredentialError::Upstream { detail, retryable }) => {
                ActionResult::upstream(detail, retryable)
            }
            CallFailure::Credential(e) => ActionResult::upstream(e.to_string(), false),
            CallFailure::TimedOut => ActionResult::upstream(self.timeout_detail(), true),
            CallFailure::Cancelled => ActionResult::upstream("Request cancelled", false),
        }
    }

    /// Complete a user authorization for the given scopes
    pub async fn complete_authorization(
        &self,
        user_id: &str,
        scopes: &Scopes,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CredentialError> {
        self.exchange(
            cancel,
            self.broker.complete_authorization(user_id, scopes, code),
        )
        .await
    }

    /// Complete a user authorization from a redirect callback
    pub async fn complete_authorization_by_state(
        &self,
        state: &str,
        code: &str,
        cancel: &CancellationToken,
    ) -> Result<(), CredentialError> {
        self.exchange(
            cancel,
            self.broker.complete_authorization_by_state(state, code),
        )
        .await
    }

    /// Run a code exchange under the call timeout.
    ///
    /// An exchange that was started stays consumed when it is interrupted,
    /// so the caller needs a fresh challenge either way.
    async fn exchange(
        &self,
        cancel: &CancellationToken,
        exchange: impl Future<Output = Result<AccessToken, CredentialError>>,
    ) -> Result<(), CredentialError> {
        let detail = match self.guarded(cancel, exchange).await {
            Ok(result) => return result.map(|_| ()),
            Err(CallFailure::Cancelled) => "Request cancelled".to_string(),
            Err(_) => self.timeout_detail(),
        };
        tracing::warn!(detail = %detail, "Authorization code exchange interrupted");
        Err(CredentialError::Upstream {
            detail,
            retryable: false,
        })
    }

    fn timeout_detail(&self) -> String {
        format!(
            "Request timed out after {} ms",
            self.config.call_timeout.as_millis()
        )
    }
}
