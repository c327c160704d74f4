//! Google OAuth 2.0 client: authorization URL, code exchange, refresh.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::token::{AccessToken, DEFAULT_EXPIRES_IN_SECS, TokenGrant, TokenPair};
use crate::config::OAuthConfig;
use crate::error::{AuthError, TransportError};

/// Google authorization endpoint.
pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google token endpoint.
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Scopes requested during consent: send mail and identify the mailbox.
pub const OAUTH_SCOPES: &[&str] = &[
    "openid",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/gmail.send",
];

/// The token-issuing side of OAuth.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Trade a refresh token for a new access token.
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, AuthError>;

    /// Trade a consent-callback authorization code for a token pair.
    async fn exchange_code(&self, code: &str) -> Result<TokenPair, AuthError>;
}

/// Response from Google token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

impl TokenResponse {
    fn into_grant(self) -> TokenGrant {
        TokenGrant {
            access_token: AccessToken::expiring_in(
                self.access_token,
                self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS),
            ),
            refresh_token: self.refresh_token.map(SecretString::from),
        }
    }
}

/// HTTP client for Google's OAuth endpoints.
pub struct OAuthClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: Url,
    token_url: String,
}

impl OAuthClient {
    pub fn new(config: &OAuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    /// Point token requests somewhere other than Google.
    pub fn with_token_url(mut self, token_url: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self
    }

    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    /// Consent URL requesting offline access so Google issues a refresh token.
    pub fn authorization_url(&self, state: &str) -> Url {
        let scopes = OAUTH_SCOPES.join(" ");
        let mut url = Url::parse(AUTH_URL).expect("AUTH_URL is a valid URL");
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", self.redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        url
    }

    async fn request_tokens(&self, params: &[(&str, &str)]) -> Result<TokenResponse, TransportError> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(|e| TransportError::Request {
                endpoint: "oauth token".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                endpoint: "oauth token".into(),
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| TransportError::Decode {
                endpoint: "oauth token".into(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl TokenEndpoint for OAuthClient {
    async fn refresh(&self, refresh_token: &SecretString) -> Result<TokenGrant, AuthError> {
        debug!("Requesting access token with refresh_token grant");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("refresh_token", refresh_token.expose_secret()),
            ("grant_type", "refresh_token"),
        ];

        match self.request_tokens(&params).await {
            Ok(response) => Ok(response.into_grant()),
            // invalid_grant and friends: the refresh token itself is no good
            Err(TransportError::Status {
                status: 400 | 401,
                body,
                ..
            }) => {
                warn!(reason = %body, "Refresh token rejected");
                Err(AuthError::RefreshRejected { reason: body })
            }
            Err(e) => Err(AuthError::Transport(e)),
        }
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenPair, AuthError> {
        info!("Exchanging authorization code for tokens");

        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self.request_tokens(&params).await?;
        if let Some(ref scope) = response.scope {
            debug!(scope = %scope, "Granted scopes");
        }

        let grant = response.into_grant();
        let refresh_token = grant.refresh_token.ok_or(AuthError::MissingRefreshToken)?;

        Ok(TokenPair {
            access_token: Some(grant.access_token),
            refresh_token,
        })
    }
}
