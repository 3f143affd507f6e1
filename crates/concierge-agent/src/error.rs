//! Error types for concierge-agent

use concierge_api::Scopes;
use thiserror::Error;

use crate::conversation::Identity;

/// Result type alias using concierge-agent Error
pub type Result<T> = std::result::Result<T, Error>;

/// Failures while obtaining or exchanging credentials.
///
/// `Clone` because a single upstream fetch may be awaited by many callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The identity provider answered with a failure or could not be reached
    #[error("Identity provider error: {detail}")]
    Upstream { detail: String, retryable: bool },

    /// The provider answered 2xx but the token was unusable
    #[error("Malformed credential: {0}")]
    MalformedCredential(String),

    /// No authorization was ever requested for this identity and scope set
    #[error("No pending authorization for {identity} with scopes '{scopes}'")]
    NoPendingAuthorization { identity: Identity, scopes: Scopes },

    /// The authorization was already exchanged once
    #[error("Authorization for {identity} with scopes '{scopes}' was already used")]
    AuthorizationConsumed { identity: Identity, scopes: Scopes },

    /// A redirect callback whose `state` matches no issued challenge
    #[error("No pending authorization matches the callback state")]
    UnknownState,
}

impl CredentialError {
    /// Out-of-order completions: the caller must start a fresh authorization
    pub fn is_precondition_failure(&self) -> bool {
        matches!(
            self,
            CredentialError::NoPendingAuthorization { .. }
                | CredentialError::AuthorizationConsumed { .. }
                | CredentialError::UnknownState
        )
    }

    /// The provider issued something unusable; only a new challenge helps
    pub fn needs_reauthorization(&self) -> bool {
        matches!(self, CredentialError::MalformedCredential(_))
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            CredentialError::Upstream { retryable, .. } => *retryable,
            _ => false,
        }
    }
}

impl From<concierge_api::Error> for CredentialError {
    fn from(error: concierge_api::Error) -> Self {
        match error {
            concierge_api::Error::MalformedToken(detail) => {
                CredentialError::MalformedCredential(detail)
            }
            other => CredentialError::Upstream {
                retryable: other.is_retryable(),
                detail: other.detail(),
            },
        }
    }
}

/// Errors surfaced by the agent layer outside of dispatch outcomes
#[derive(Error, Debug)]
pub enum Error {
    /// A dispatch request that could not be understood
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
