//! Dispatch outcomes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::milestones::Milestone;

/// Successful action output
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPayload {
    /// One-line summary for the decision layer
    pub message: String,
    /// Fields that may be shown to the end user
    pub user_facing: Value,
    /// Collaborator response as received. Never crosses the dispatch boundary.
    pub raw: Value,
}

/// Result of one dispatch. Exactly one variant per call.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionResult {
    Ok(ActionPayload),
    /// The user must grant consent at `url` before retrying
    AuthorizationRequired { url: String },
    PreconditionFailed { missing: Milestone },
    UpstreamError { detail: String, retryable: bool },
    InvalidParameters { detail: String },
}

/// Discriminant of an [`ActionResult`], as sent over the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Ok,
    AuthorizationRequired,
    PreconditionFailed,
    UpstreamError,
    InvalidParameters,
    /// Authorization callback accepted
    Authorized,
}

impl ActionResult {
    pub fn kind(&self) -> OutcomeKind {
        match self {
            ActionResult::Ok(_) => OutcomeKind::Ok,
            ActionResult::AuthorizationRequired { .. } => OutcomeKind::AuthorizationRequired,
            ActionResult::PreconditionFailed { .. } => OutcomeKind::PreconditionFailed,
            ActionResult::UpstreamError { .. } => OutcomeKind::UpstreamError,
            ActionResult::InvalidParameters { .. } => OutcomeKind::InvalidParameters,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ActionResult::Ok(_))
    }

    pub(crate) fn upstream(detail: impl Into<String>, retryable: bool) -> Self {
        ActionResult::UpstreamError {
            detail: detail.into(),
            retryable,
        }
    }

    /// Human-readable explanation for non-`Ok` outcomes
    pub fn error_detail(&self) -> Option<String> {
        match self {
            ActionResult::Ok(_) | ActionResult::AuthorizationRequired { .. } => None,
            ActionResult::PreconditionFailed { missing } => Some(format!(
                "Please {} first",
                missing.step()
            )),
            ActionResult::UpstreamError { detail, .. }
            | ActionResult::InvalidParameters { detail } => Some(detail.clone()),
        }
    }
}
