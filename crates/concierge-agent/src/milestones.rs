//! Per-conversation booking milestones.
//!
//! Each conversation accumulates a set of milestones. The set only grows:
//! reaching one milestone never removes another, and every legality check is
//! a membership test against the set.

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::conversation::ConversationId;

/// A discrete step reached in a conversation's booking progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    HotelsFetched,
    RoomsFetched,
    RoomsSearched,
    ConfirmationInitiated,
    ConfirmationCompleted,
    BookingInitiated,
    BookingCompleted,
    BookingsFetched,
    CalendarAdded,
}

impl Milestone {
    pub const ALL: [Milestone; 9] = [
        Milestone::HotelsFetched,
        Milestone::RoomsFetched,
        Milestone::RoomsSearched,
        Milestone::ConfirmationInitiated,
        Milestone::ConfirmationCompleted,
        Milestone::BookingInitiated,
        Milestone::BookingCompleted,
        Milestone::BookingsFetched,
        Milestone::CalendarAdded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::HotelsFetched => "hotels_fetched",
            Milestone::RoomsFetched => "rooms_fetched",
            Milestone::RoomsSearched => "rooms_searched",
            Milestone::ConfirmationInitiated => "confirmation_initiated",
            Milestone::ConfirmationCompleted => "confirmation_completed",
            Milestone::BookingInitiated => "booking_initiated",
            Milestone::BookingCompleted => "booking_completed",
            Milestone::BookingsFetched => "bookings_fetched",
            Milestone::CalendarAdded => "calendar_added",
        }
    }

    /// The user-level step that produces this milestone, for "complete X first" messages
    pub fn step(&self) -> &'static str {
        match self {
            Milestone::HotelsFetched => "browse the hotel list",
            Milestone::RoomsFetched => "list the rooms of a hotel",
            Milestone::RoomsSearched => "search for rooms",
            Milestone::ConfirmationInitiated => "review and confirm the room",
            Milestone::ConfirmationCompleted => "finish the booking confirmation",
            Milestone::BookingInitiated | Milestone::BookingCompleted => "book the room",
            Milestone::BookingsFetched => "look up your bookings",
            Milestone::CalendarAdded => "add the booking to your calendar",
        }
    }
}

/// Milestones reached by one conversation, in declaration order
pub type MilestoneSet = BTreeSet<Milestone>;

/// Process-wide milestone store, partitioned by conversation.
///
/// The outer map lock is only held to find or create a conversation's slot.
/// Each slot has its own mutex, so writers on different conversations never
/// wait on each other.
#[derive(Debug, Default)]
pub struct MilestoneTracker {
    conversations: RwLock<HashMap<ConversationId, Arc<Mutex<MilestoneSet>>>>,
}

impl MilestoneTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, conversation: &ConversationId) -> Option<Arc<Mutex<MilestoneSet>>> {
        self.conversations.read().get(conversation).cloned()
    }

    fn slot_or_create(&self, conversation: &ConversationId) -> Arc<Mutex<MilestoneSet>> {
        if let Some(slot) = self.slot(conversation) {
            return slot;
        }
        Arc::clone(
            self.conversations
                .write()
                .entry(conversation.clone())
                .or_default(),
        )
    }

    /// Add a milestone. Returns `true` if the set changed.
    pub fn achieve(&self, conversation: &ConversationId, milestone: Milestone) -> bool {
        !self.achieve_all(conversation, &[milestone]).is_empty()
    }

    /// Add several milestones in order under one lock. Returns the ones that were new.
    pub fn achieve_all(
        &self,
        conversation: &ConversationId,
        milestones: &[Milestone],
    ) -> Vec<Milestone> {
        let slot = self.slot_or_create(conversation);
        let mut set = slot.lock();
        let mut added = Vec::new();
        for milestone in milestones {
            if set.insert(*milestone) {
                added.push(*milestone);
                tracing::debug!(
                    conversation = %conversation,
                    milestone = milestone.as_str(),
                    "Milestone achieved"
                );
            }
        }
        added
    }

    pub fn has(&self, conversation: &ConversationId, milestone: Milestone) -> bool {
        self.slot(conversation)
            .is_some_and(|slot| slot.lock().contains(&milestone))
    }

    /// Copy of the conversation's milestones. Unknown conversations are empty.
    pub fn snapshot(&self, conversation: &ConversationId) -> MilestoneSet {
        self.slot(conversation)
            .map(|slot| slot.lock().clone())
            .unwrap_or_default()
    }

    /// Number of conversations with at least one recorded write
    pub fn conversation_count(&self) -> usize {
        self.conversations.read().len()
    }

    /// Forget every conversation
    pub fn reset(&self) {
        self.conversations.write().clear();
    }
}
