//! Configuration types.
//!
//! Everything is read from environment variables once at startup. Missing
//! required values are a [`ConfigError`] and the process exits.

use std::path::PathBuf;

use secrecy::SecretString;
use url::Url;

use crate::error::{AuthError, ConfigError};
use crate::pipeline::types::is_email_address;

/// Default chat-completions model.
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";

/// Default OpenAI-compatible API base.
pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";

/// Language-model settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub base_url: String,
}

/// Google OAuth client settings.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: Url,
    /// Long-lived refresh token from a previous consent flow.
    pub refresh_token: Option<SecretString>,
}

impl OAuthConfig {
    /// The refresh token the pipeline runs on.
    pub fn require_refresh_token(&self) -> Result<SecretString, AuthError> {
        self.refresh_token.clone().ok_or(AuthError::NoRefreshToken)
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    /// Usernames or numeric ids; `*` allows everyone.
    pub allowed_users: Vec<String>,
}

/// Process configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub telegram: TelegramConfig,
    pub llm: LlmConfig,
    pub oauth: OAuthConfig,
    /// Mailbox the emails are sent from.
    pub sender_email: String,
    /// Also read messages from stdin.
    pub enable_cli: bool,
    /// Directory for a daily-rolling log file.
    pub log_dir: Option<PathBuf>,
}

/// What the process does after loading its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupMode {
    /// No refresh token yet: serve the OAuth callback once, then exit.
    RunConsentFlow,
    /// Relay chat messages into emails.
    RunPipeline,
}

impl RelayConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let bot_token = require("TELEGRAM_BOT_TOKEN")?;
        let allowed_users: Vec<String> = get("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let llm = LlmConfig {
            api_key: SecretString::from(require("OPENAI_API_KEY")?),
            model: get("LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            base_url: get("LLM_BASE_URL")
                .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
        };

        let redirect_raw = require("GOOGLE_REDIRECT_URI")?;
        let redirect_uri = Url::parse(&redirect_raw).map_err(|e| ConfigError::InvalidValue {
            key: "GOOGLE_REDIRECT_URI".into(),
            message: e.to_string(),
        })?;
        if redirect_uri.host_str().is_none() {
            return Err(ConfigError::InvalidValue {
                key: "GOOGLE_REDIRECT_URI".into(),
                message: "redirect URI has no host".into(),
            });
        }

        let oauth = OAuthConfig {
            client_id: require("GOOGLE_CLIENT_ID")?,
            client_secret: SecretString::from(require("GOOGLE_CLIENT_SECRET")?),
            redirect_uri,
            refresh_token: get("GOOGLE_REFRESH_TOKEN").map(SecretString::from),
        };

        let sender_email = require("SENDER_EMAIL")?;
        if !is_email_address(&sender_email) {
            return Err(ConfigError::InvalidValue {
                key: "SENDER_EMAIL".into(),
                message: format!("{sender_email:?} is not an email address"),
            });
        }

        let enable_cli = get("MAIL_RELAY_CLI")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Self {
            telegram: TelegramConfig {
                bot_token: SecretString::from(bot_token),
                allowed_users,
            },
            llm,
            oauth,
            sender_email,
            enable_cli,
            log_dir: get("MAIL_RELAY_LOG_DIR").map(PathBuf::from),
        })
    }

    /// Pick the startup mode. Decided once per process.
    pub fn startup_mode(&self) -> StartupMode {
        if self.oauth.refresh_token.is_some() {
            StartupMode::RunPipeline
        } else {
            StartupMode::RunConsentFlow
        }
    }
}
