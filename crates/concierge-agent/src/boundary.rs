//! Wire types for the dispatch and authorization-callback boundaries.
//!
//! Only user-facing fields cross this boundary. Raw collaborator bodies and
//! tokens never do, and the challenge URL is only ever in `challengeUrl`.

use concierge_api::Scopes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::action::ActionKind;
use crate::conversation::ConversationId;
use crate::dispatcher::{ActionDispatcher, ActionRequest};
use crate::error::{CredentialError, Error, Result};
use crate::milestones::{Milestone, MilestoneSet};
use crate::outcome::{ActionResult, OutcomeKind};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub conversation_id: ConversationId,
    /// Action name, e.g. `search_rooms` or `SearchRooms`
    pub action_type: String,
    #[serde(default)]
    pub action_parameters: Value,
    pub caller_identity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub conversation_id: ConversationId,
    pub outcome_kind: OutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub missing_milestone: Option<Milestone>,
    pub milestone_snapshot: Vec<Milestone>,
}

impl DispatchResponse {
    pub fn from_result(
        conversation_id: ConversationId,
        result: ActionResult,
        snapshot: MilestoneSet,
    ) -> Self {
        let mut response = Self {
            conversation_id,
            outcome_kind: result.kind(),
            message: None,
            payload: None,
            challenge_url: None,
            error_detail: result.error_detail(),
            retryable: None,
            missing_milestone: None,
            milestone_snapshot: snapshot.into_iter().collect(),
        };
        match result {
            ActionResult::Ok(payload) => {
                response.message = Some(payload.message);
                response.payload = Some(payload.user_facing);
            }
            ActionResult::AuthorizationRequired { url } => {
                response.challenge_url = Some(url);
            }
            ActionResult::PreconditionFailed { missing } => {
                response.missing_milestone = Some(missing);
            }
            ActionResult::UpstreamError { retryable, .. } => {
                response.retryable = Some(retryable);
            }
            ActionResult::InvalidParameters { .. } => {}
        }
        response
    }
}

/// Redirect callback from the identity provider, or an explicit completion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuthorizationCallback {
    ByState {
        state: String,
        code: String,
    },
    #[serde(rename_all = "camelCase")]
    ByIdentity {
        caller_identity: String,
        scopes: Scopes,
        code: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResponse {
    pub outcome_kind: OutcomeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl AuthorizationResponse {
    fn from_result(result: std::result::Result<(), CredentialError>) -> Self {
        match result {
            Ok(()) => Self {
                outcome_kind: OutcomeKind::Authorized,
                error_detail: None,
            },
            Err(e) => Self {
                outcome_kind: if e.is_precondition_failure() {
                    OutcomeKind::PreconditionFailed
                } else if e.needs_reauthorization() {
                    OutcomeKind::AuthorizationRequired
                } else {
                    OutcomeKind::UpstreamError
                },
                error_detail: Some(e.to_string()),
            },
        }
    }
}

/// One inbound message on a boundary session
#[derive(Debug, Clone)]
pub enum BoundaryMessage {
    Dispatch(DispatchRequest),
    Authorize(AuthorizationCallback),
}

impl BoundaryMessage {
    /// Messages carrying `actionType` are dispatch requests, anything else is
    /// an authorization callback.
    pub fn parse(line: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| Error::InvalidRequest(format!("Invalid JSON: {}", e)))?;
        if value.get("actionType").is_some() {
            serde_json::from_value(value)
                .map(BoundaryMessage::Dispatch)
                .map_err(|e| Error::InvalidRequest(e.to_string()))
        } else {
            serde_json::from_value(value)
                .map(BoundaryMessage::Authorize)
                .map_err(|_| {
                    Error::InvalidRequest(
                        "Expected a dispatch request or an authorization callback".to_string(),
                    )
                })
        }
    }
}

impl ActionDispatcher {
    /// Dispatch a boundary request and attach the resulting milestone snapshot
    pub async fn handle(
        &self,
        request: DispatchRequest,
        cancel: &CancellationToken,
    ) -> DispatchResponse {
        let conversation = request.conversation_id;
        let result = if request.caller_identity.trim().is_empty() {
            ActionResult::InvalidParameters {
                detail: "callerIdentity must not be empty".to_string(),
            }
        } else {
            match ActionKind::parse(&request.action_type) {
                Some(action) => {
                    let action_request = ActionRequest {
                        conversation: conversation.clone(),
                        action,
                        params: request.action_parameters,
                        user_id: request.caller_identity,
                    };
                    self.dispatch(&action_request, cancel).await
                }
                None => ActionResult::InvalidParameters {
                    detail: format!("Unknown action type '{}'", request.action_type),
                },
            }
        };
        let snapshot = self.snapshot(&conversation);
        DispatchResponse::from_result(conversation, result, snapshot)
    }

    /// Complete a pending authorization from the callback boundary
    pub async fn authorize(
        &self,
        callback: AuthorizationCallback,
        cancel: &CancellationToken,
    ) -> AuthorizationResponse {
        let result = match callback {
            AuthorizationCallback::ByState { state, code } => {
                self.complete_authorization_by_state(&state, &code, cancel)
                    .await
            }
            AuthorizationCallback::ByIdentity {
                caller_identity,
                scopes,
                code,
            } => {
                self.complete_authorization(&caller_identity, &scopes, &code, cancel)
                    .await
            }
        };
        AuthorizationResponse::from_result(result)
    }
}
