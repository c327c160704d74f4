//! OAuth token values.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};

/// Tokens are treated as expired this long before their real expiry.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

/// A short-lived bearer token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    secret: SecretString,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: SecretString::from(secret.into()),
            expires_at,
        }
    }

    /// Token that expires `expires_in_secs` from now.
    pub fn expiring_in(secret: impl Into<String>, expires_in_secs: i64) -> Self {
        Self::new(secret, Utc::now() + Duration::seconds(expires_in_secs))
    }

    /// Raw bearer value for an `Authorization` header.
    pub fn secret(&self) -> &str {
        self.secret.expose_secret()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }

    /// Same bearer value, regardless of expiry bookkeeping.
    pub fn same_token(&self, other: &AccessToken) -> bool {
        self.secret() == other.secret()
    }
}

/// Access token plus the long-lived refresh token that renews it.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: Option<AccessToken>,
    pub refresh_token: SecretString,
}

/// What the token endpoint hands back for a grant.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: AccessToken,
    /// Present on code exchange; on refresh only when the provider rotates it.
    pub refresh_token: Option<SecretString>,
}
