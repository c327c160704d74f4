//! Error types for mail-relay.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Consent flow error: {0}")]
    Consent(#[from] ConsentError),
}

/// Configuration-related errors. Always fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Network or provider failure on an outbound HTTP call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Could not decode response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },
}

/// OAuth token errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No refresh token configured; run the consent flow first")]
    NoRefreshToken,

    #[error("Token endpoint rejected the refresh token: {reason}")]
    RefreshRejected { reason: String },

    #[error("Token endpoint response had no refresh token")]
    MissingRefreshToken,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure of a single dispatch attempt.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Could not obtain an access token: {0}")]
    Auth(#[from] AuthError),

    #[error("Mail provider rejected the access token")]
    TokenRejected,

    #[error("Could not build the message: {reason}")]
    InvalidMessage { reason: String },

    #[error("Mail provider request failed: {0}")]
    Transport(#[from] TransportError),
}

/// Why a chat message did not yield an email command.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Completion request failed: {0}")]
    Completion(#[from] LlmError),

    #[error("No JSON object in model output")]
    NoJsonObject,

    #[error("Model output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Field {0} is missing or empty")]
    MissingField(&'static str),

    #[error("Recipient {0:?} is not an email address")]
    InvalidRecipient(String),
}

/// Channel-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned HTTP {status}: {body}")]
    HttpStatus {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One-time consent flow errors.
#[derive(Debug, thiserror::Error)]
pub enum ConsentError {
    #[error("Could not bind callback listener on {addr}: {reason}")]
    Bind { addr: String, reason: String },

    #[error("Callback server failed: {0}")]
    Server(String),

    #[error("Callback server stopped before receiving tokens")]
    Aborted,
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
