//! Dispatch event types

use serde::{Deserialize, Serialize};

use crate::action::ActionKind;
use crate::conversation::ConversationId;
use crate::milestones::Milestone;

/// Events emitted while dispatching actions.
///
/// Challenge URLs and tokens are never carried here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    /// Dispatch accepted for processing
    ActionStart {
        conversation: ConversationId,
        action: ActionKind,
    },

    /// Rejected before any credential or collaborator call
    PreconditionFailed {
        conversation: ConversationId,
        action: ActionKind,
        missing: Milestone,
    },

    /// The user was sent to the identity provider
    AuthorizationRequired {
        conversation: ConversationId,
        action: ActionKind,
    },

    /// A read is about to be repeated after a retryable failure
    RetryScheduled {
        conversation: ConversationId,
        action: ActionKind,
        attempt: u32,
        delay_ms: u64,
    },

    /// A milestone was newly reached
    MilestoneAchieved {
        conversation: ConversationId,
        milestone: Milestone,
    },

    /// Action completed successfully
    ActionEnd {
        conversation: ConversationId,
        action: ActionKind,
    },

    /// Action failed. Nothing was granted.
    ActionFailed {
        conversation: ConversationId,
        action: ActionKind,
        detail: String,
    },
}

impl DispatchEvent {
    /// Check if this is the last event of a dispatch
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchEvent::ActionEnd { .. }
                | DispatchEvent::ActionFailed { .. }
                | DispatchEvent::PreconditionFailed { .. }
                | DispatchEvent::AuthorizationRequired { .. }
        )
    }

    pub fn conversation(&self) -> &ConversationId {
        match self {
            DispatchEvent::ActionStart { conversation, .. }
            | DispatchEvent::PreconditionFailed { conversation, .. }
            | DispatchEvent::AuthorizationRequired { conversation, .. }
            | DispatchEvent::RetryScheduled { conversation, .. }
            | DispatchEvent::MilestoneAchieved { conversation, .. }
            | DispatchEvent::ActionEnd { conversation, .. }
            | DispatchEvent::ActionFailed { conversation, .. } => conversation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = DispatchEvent::MilestoneAchieved {
            conversation: ConversationId::new("C1"),
            milestone: Milestone::BookingCompleted,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "milestone_achieved");
        assert_eq!(json["conversation"], "C1");
        assert_eq!(json["milestone"], "booking_completed");
    }

    #[test]
    fn test_terminal_events() {
        let c = ConversationId::new("C1");
        assert!(
            DispatchEvent::ActionEnd {
                conversation: c.clone(),
                action: ActionKind::Book
            }
            .is_terminal()
        );
        assert!(
            !DispatchEvent::RetryScheduled {
                conversation: c,
                action: ActionKind::SearchRooms,
                attempt: 1,
                delay_ms: 10
            }
            .is_terminal()
        );
    }
}
