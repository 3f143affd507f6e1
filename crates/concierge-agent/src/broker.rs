//! Credential broker: app-level and user-delegated OAuth2 tokens.
//!
//! App tokens come from the client-credentials grant and are fetched on
//! demand. Concurrent requests for the same scope set share one upstream
//! fetch. User tokens need the end user's consent: the broker hands out an
//! authorization URL, remembers the pending request, and later exchanges the
//! returned code exactly once.

use chrono::{DateTime, Utc};
use concierge_api::{AccessToken, GrantKind, IdentityProvider, Scopes};
use futures::future::{BoxFuture, FutureExt, Shared, WeakShared};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::conversation::Identity;
use crate::error::CredentialError;

/// Cache key: at most one live token per (identity, scope set)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    pub identity: Identity,
    pub scopes: Scopes,
}

impl CredentialKey {
    pub fn machine(scopes: Scopes) -> Self {
        Self {
            identity: Identity::Machine,
            scopes,
        }
    }

    pub fn user(user_id: &str, scopes: Scopes) -> Self {
        Self {
            identity: Identity::user(user_id),
            scopes,
        }
    }
}

/// A consent request waiting for the user to come back with a code
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub identity: Identity,
    pub scopes: Scopes,
    /// Sent as both `state` and `nonce`
    pub nonce: String,
    pub code: Option<String>,
    pub consumed: bool,
    pub created_at: DateTime<Utc>,
}

impl AuthorizationRequest {
    fn new(identity: Identity, scopes: Scopes, nonce: String) -> Self {
        Self {
            identity,
            scopes,
            nonce,
            code: None,
            consumed: false,
            created_at: Utc::now(),
        }
    }
}

/// Answer to a user-token request
#[derive(Debug, Clone)]
pub enum UserCredential {
    Ready(AccessToken),
    /// The user must visit `url` before a token can be issued
    AuthorizationRequired { url: String },
}

/// Optional expiry. `None` keeps entries for the life of the process.
#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    pub token_ttl: Option<Duration>,
    pub pending_ttl: Option<Duration>,
}

type FetchFuture = BoxFuture<'static, Result<AccessToken, CredentialError>>;

enum AppLookup {
    Cached(AccessToken),
    Fetch(Shared<FetchFuture>),
}

struct BrokerState {
    provider: Arc<dyn IdentityProvider>,
    config: BrokerConfig,
    tokens: RwLock<HashMap<CredentialKey, AccessToken>>,
    /// Weak so that a fetch every caller abandoned is dropped, not resumed.
    /// Lock order: `in_flight` before `tokens`.
    in_flight: Mutex<HashMap<Scopes, WeakShared<FetchFuture>>>,
    pending: Mutex<HashMap<CredentialKey, AuthorizationRequest>>,
    /// Bumped by `reset` under the `in_flight` lock. Fetches from an older
    /// generation neither cache nor touch `in_flight`.
    generation: AtomicU64,
}

impl BrokerState {
    fn cached(&self, key: &CredentialKey) -> Option<AccessToken> {
        let tokens = self.tokens.read();
        let token = tokens.get(key)?;
        if expired(token.issued_at, self.config.token_ttl) {
            return None;
        }
        Some(token.clone())
    }

    fn store(&self, key: CredentialKey, token: &AccessToken) {
        self.tokens.write().insert(key, token.clone());
    }

    fn finish_app_fetch(
        &self,
        scopes: &Scopes,
        generation: u64,
        result: concierge_api::Result<String>,
    ) -> Result<AccessToken, CredentialError> {
        let mut in_flight = self.in_flight.lock();
        let current = self.generation.load(Ordering::SeqCst) == generation;
        if current {
            in_flight.remove(scopes);
        }
        match result {
            Ok(secret) => {
                let token = AccessToken::new(secret, GrantKind::ClientCredentials, scopes.clone());
                if current {
                    self.store(CredentialKey::machine(scopes.clone()), &token);
                    tracing::info!(scope = %scopes, "App token issued");
                } else {
                    tracing::debug!(scope = %scopes, "App token issued before reset, not cached");
                }
                Ok(token)
            }
            Err(e) => {
                tracing::warn!(scope = %scopes, error = %e, "App token request failed");
                Err(e.into())
            }
        }
    }
}

fn expired(at: DateTime<Utc>, ttl: Option<Duration>) -> bool {
    let Some(ttl) = ttl else {
        return false;
    };
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => Utc::now() - at >= ttl,
        Err(_) => false,
    }
}

fn new_nonce() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..16].to_string()
}

/// Process-wide credential broker. Cloning shares the same caches.
#[derive(Clone)]
pub struct CredentialBroker {
    state: Arc<BrokerState>,
}

impl CredentialBroker {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self::with_config(provider, BrokerConfig::default())
    }

    pub fn with_config(provider: Arc<dyn IdentityProvider>, config: BrokerConfig) -> Self {
        Self {
            state: Arc::new(BrokerState {
                provider,
                config,
                tokens: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }

    /// Get an app token, fetching it with the client-credentials grant if needed.
    ///
    /// Callers that arrive while a fetch for the same scopes is running await
    /// that fetch instead of starting their own, and all of them see its
    /// outcome. Dropping every waiter aborts the fetch without caching anything.
    pub async fn app_token(&self, scopes: &Scopes) -> Result<AccessToken, CredentialError> {
        match self.lookup_app_token(scopes) {
            AppLookup::Cached(token) => Ok(token),
            AppLookup::Fetch(fetch) => fetch.await,
        }
    }

    fn lookup_app_token(&self, scopes: &Scopes) -> AppLookup {
        let key = CredentialKey::machine(scopes.clone());
        if let Some(token) = self.state.cached(&key) {
            return AppLookup::Cached(token);
        }

        let mut in_flight = self.state.in_flight.lock();
        // A fetch may have completed between the cache check and taking the lock
        if let Some(token) = self.state.cached(&key) {
            return AppLookup::Cached(token);
        }
        if let Some(fetch) = in_flight.get(scopes).and_then(WeakShared::upgrade) {
            tracing::debug!(scope = %scopes, "Joining in-flight app token fetch");
            return AppLookup::Fetch(fetch);
        }

        let state = Arc::clone(&self.state);
        let owned = scopes.clone();
        let generation = self.state.generation.load(Ordering::SeqCst);
        let fetch = async move {
            let result = state.provider.client_credentials(&owned).await;
            state.finish_app_fetch(&owned, generation, result)
        }
        .boxed()
        .shared();

        if let Some(weak) = fetch.downgrade() {
            in_flight.insert(scopes.clone(), weak);
        }
        AppLookup::Fetch(fetch)
    }

    /// Get a user-delegated token, or an authorization URL if none is cached.
    ///
    /// Never waits on the user. A new challenge for the same user and scopes
    /// replaces any earlier pending one.
    pub fn user_token(&self, user_id: &str, scopes: &Scopes) -> UserCredential {
        let key = CredentialKey::user(user_id, scopes.clone());
        if let Some(token) = self.state.cached(&key) {
            return UserCredential::Ready(token);
        }

        let nonce = new_nonce();
        let url = self.state.provider.authorization_url(scopes, &nonce);
        let request = AuthorizationRequest::new(key.identity.clone(), scopes.clone(), nonce);
        self.state.pending.lock().insert(key, request);

        tracing::info!(user = user_id, scope = %scopes, "Authorization challenge issued");
        UserCredential::AuthorizationRequired { url }
    }

    /// Exchange the code returned by the provider for a user token.
    ///
    /// The pending request is consumed before the exchange starts, so a code
    /// can be presented at most once even if the exchange fails.
    pub async fn complete_authorization(
        &self,
        user_id: &str,
        scopes: &Scopes,
        code: &str,
    ) -> Result<AccessToken, CredentialError> {
        let key = CredentialKey::user(user_id, scopes.clone());
        let request = {
            let mut pending = self.state.pending.lock();
            self.claim(&mut pending, &key, code)?
        };
        self.exchange(request, code).await
    }

    /// Redirect-callback variant: the provider hands back only `state` and `code`.
    pub async fn complete_authorization_by_state(
        &self,
        state: &str,
        code: &str,
    ) -> Result<AccessToken, CredentialError> {
        let request = {
            let mut pending = self.state.pending.lock();
            let key = pending
                .iter()
                .find(|(_, request)| request.nonce == state)
                .map(|(key, _)| key.clone());
            let Some(key) = key else {
                tracing::warn!("Authorization callback with unknown state");
                return Err(CredentialError::UnknownState);
            };
            self.claim(&mut pending, &key, code)?
        };
        self.exchange(request, code).await
    }

    fn claim(
        &self,
        pending: &mut HashMap<CredentialKey, AuthorizationRequest>,
        key: &CredentialKey,
        code: &str,
    ) -> Result<AuthorizationRequest, CredentialError> {
        let stale = pending
            .get(key)
            .is_some_and(|r| !r.consumed && expired(r.created_at, self.state.config.pending_ttl));
        if stale {
            pending.remove(key);
        }

        let Some(request) = pending.get_mut(key) else {
            tracing::warn!(
                identity = %key.identity,
                scope = %key.scopes,
                "Authorization completed with no pending request"
            );
            return Err(CredentialError::NoPendingAuthorization {
                identity: key.identity.clone(),
                scopes: key.scopes.clone(),
            });
        };

        if request.consumed {
            tracing::warn!(
                identity = %key.identity,
                scope = %key.scopes,
                "Authorization code replayed"
            );
            return Err(CredentialError::AuthorizationConsumed {
                identity: key.identity.clone(),
                scopes: key.scopes.clone(),
            });
        }

        request.code = Some(code.to_string());
        request.consumed = true;
        Ok(request.clone())
    }

    async fn exchange(
        &self,
        request: AuthorizationRequest,
        code: &str,
    ) -> Result<AccessToken, CredentialError> {
        match self
            .state
            .provider
            .exchange_code(code, &request.scopes)
            .await
        {
            Ok(secret) => {
                let token =
                    AccessToken::new(secret, GrantKind::AuthorizationCode, request.scopes.clone());
                let key = CredentialKey {
                    identity: request.identity.clone(),
                    scopes: request.scopes.clone(),
                };
                self.state.store(key, &token);
                tracing::info!(
                    identity = %request.identity,
                    scope = %request.scopes,
                    "User token issued"
                );
                Ok(token)
            }
            Err(e) => {
                tracing::warn!(
                    identity = %request.identity,
                    scope = %request.scopes,
                    error = %e,
                    "Authorization code exchange failed"
                );
                Err(e.into())
            }
        }
    }

    /// Drop a cached token, e.g. after a service rejected it
    pub fn invalidate(&self, identity: &Identity, scopes: &Scopes) -> bool {
        let key = CredentialKey {
            identity: identity.clone(),
            scopes: scopes.clone(),
        };
        let removed = self.state.tokens.write().remove(&key).is_some();
        if removed {
            tracing::info!(identity = %identity, scope = %scopes, "Cached token invalidated");
        }
        removed
    }

    /// Cached token for a key, without fetching
    pub fn cached_token(&self, identity: &Identity, scopes: &Scopes) -> Option<AccessToken> {
        self.state.cached(&CredentialKey {
            identity: identity.clone(),
            scopes: scopes.clone(),
        })
    }

    /// The pending (or consumed) authorization request for a user and scopes
    pub fn pending_authorization(
        &self,
        user_id: &str,
        scopes: &Scopes,
    ) -> Option<AuthorizationRequest> {
        self.state
            .pending
            .lock()
            .get(&CredentialKey::user(user_id, scopes.clone()))
            .cloned()
    }

    /// Forget all tokens, in-flight fetches and pending authorizations
    pub fn reset(&self) {
        let mut in_flight = self.state.in_flight.lock();
        self.state.generation.fetch_add(1, Ordering::SeqCst);
        in_flight.clear();
        self.state.tokens.write().clear();
        drop(in_flight);
        self.state.pending.lock().clear();
    }
}
