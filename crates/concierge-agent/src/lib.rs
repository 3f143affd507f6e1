//! concierge-agent: credential broker and milestone-gated action dispatcher
//!
//! The dispatcher receives one action at a time from an external decision
//! layer, checks the conversation's milestones, obtains app-level or
//! user-delegated OAuth2 tokens from the broker, calls the backend service,
//! and records the milestones the action grants.

pub mod action;
pub mod boundary;
pub mod broker;
pub mod conversation;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod milestones;
pub mod outcome;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{ActionKind, ActionParams, ActionSpec, CredentialKind};
pub use boundary::{
    AuthorizationCallback, AuthorizationResponse, BoundaryMessage, DispatchRequest,
    DispatchResponse,
};
pub use broker::{BrokerConfig, CredentialBroker, CredentialKey, UserCredential};
pub use conversation::{ConversationId, Identity};
pub use dispatcher::{ActionDispatcher, ActionRequest, DispatcherConfig, RetryConfig, Services};
pub use error::{CredentialError, Error, Result};
pub use events::DispatchEvent;
pub use milestones::{Milestone, MilestoneSet, MilestoneTracker};
pub use outcome::{ActionPayload, ActionResult, OutcomeKind};
