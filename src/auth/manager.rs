//! Cached access token with on-demand refresh.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use secrecy::SecretString;
use tracing::{debug, info};

use crate::auth::client::TokenEndpoint;
use crate::auth::token::{AccessToken, TokenPair};
use crate::error::AuthError;

#[derive(Debug)]
struct TokenState {
    access_token: Option<AccessToken>,
    refresh_token: SecretString,
}

/// Owns the token pair. The only way to read it is [`ensure_access_token`].
///
/// The lock is never held across the refresh request. Concurrent callers may
/// each refresh; whichever finishes last leaves its token in the cache.
///
/// [`ensure_access_token`]: TokenManager::ensure_access_token
pub struct TokenManager {
    endpoint: Arc<dyn TokenEndpoint>,
    state: RwLock<TokenState>,
}

impl TokenManager {
    /// Manager with only a refresh token; the first send triggers a refresh.
    pub fn new(endpoint: Arc<dyn TokenEndpoint>, refresh_token: SecretString) -> Self {
        Self {
            endpoint,
            state: RwLock::new(TokenState {
                access_token: None,
                refresh_token,
            }),
        }
    }

    /// Manager seeded with a full pair, e.g. straight from a code exchange.
    pub fn with_pair(endpoint: Arc<dyn TokenEndpoint>, pair: TokenPair) -> Self {
        Self {
            endpoint,
            state: RwLock::new(TokenState {
                access_token: pair.access_token,
                refresh_token: pair.refresh_token,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TokenState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, TokenState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a usable access token, refreshing when the cached one is
    /// missing, expired or was rejected by the provider.
    pub async fn ensure_access_token(&self) -> Result<AccessToken, AuthError> {
        let refresh_token = {
            let state = self.read();
            if let Some(token) = state.access_token.as_ref().filter(|t| !t.is_expired()) {
                return Ok(token.clone());
            }
            state.refresh_token.clone()
        };

        debug!("Cached access token missing or expired, refreshing");
        let grant = self.endpoint.refresh(&refresh_token).await?;

        {
            let mut state = self.write();
            state.access_token = Some(grant.access_token.clone());
            if let Some(rotated) = grant.refresh_token {
                state.refresh_token = rotated;
            }
        }

        info!(expires_at = %grant.access_token.expires_at(), "Access token refreshed");
        Ok(grant.access_token)
    }

    /// The provider refused `token`. Drop it so the next call refreshes.
    ///
    /// A newer token installed by a concurrent refresh is left alone.
    pub fn mark_rejected(&self, token: &AccessToken) {
        let mut state = self.write();
        if state
            .access_token
            .as_ref()
            .is_some_and(|cached| cached.same_token(token))
        {
            debug!("Dropping rejected access token");
            state.access_token = None;
        }
    }
}
