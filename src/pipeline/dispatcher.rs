//! Mail dispatcher: sends an [`EmailCommand`] through the Gmail API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::auth::TokenManager;
use crate::error::{DispatchError, TransportError};
use crate::pipeline::envelope::{build_message, encode_raw};
use crate::pipeline::types::{EmailCommand, SendResult};

/// Gmail REST API root.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com";

/// Anything that can deliver an email command.
///
/// One call is one attempt. Failures come back as [`SendResult::Failure`]
/// and are never retried here.
#[async_trait]
pub trait MailDispatcher: Send + Sync {
    async fn send(&self, cmd: EmailCommand) -> SendResult;
}

/// Response body of `users.messages.send`.
#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
    #[serde(rename = "threadId")]
    thread_id: Option<String>,
}

/// Sends as the authorized mailbox owner via `users/me/messages/send`.
pub struct GmailDispatcher {
    http: reqwest::Client,
    tokens: Arc<TokenManager>,
    sender: String,
    base_url: String,
}

impl GmailDispatcher {
    pub fn new(tokens: Arc<TokenManager>, sender: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
            sender: sender.into(),
            base_url: GMAIL_API_BASE.to_string(),
        }
    }

    /// Use a different API root (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/gmail/v1/users/me/messages/send", self.base_url)
    }

    async fn try_send(&self, cmd: &EmailCommand) -> Result<String, DispatchError> {
        let raw = encode_raw(&build_message(&self.sender, cmd)?);
        let token = self.tokens.ensure_access_token().await?;

        let resp = self
            .http
            .post(self.endpoint())
            .bearer_auth(token.secret())
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await
            .map_err(|e| TransportError::Request {
                endpoint: "gmail send".into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.mark_rejected(&token);
            return Err(DispatchError::TokenRejected);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                endpoint: "gmail send".into(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let sent: SentMessage = resp.json().await.map_err(|e| TransportError::Decode {
            endpoint: "gmail send".into(),
            reason: e.to_string(),
        })?;

        if let Some(thread_id) = sent.thread_id.as_deref() {
            debug!(message_id = %sent.id, thread_id = %thread_id, "Gmail accepted message");
        }
        Ok(sent.id)
    }
}

#[async_trait]
impl MailDispatcher for GmailDispatcher {
    async fn send(&self, cmd: EmailCommand) -> SendResult {
        match self.try_send(&cmd).await {
            Ok(provider_message_id) => {
                info!(
                    recipient = %cmd.recipient(),
                    message_id = %provider_message_id,
                    "Email sent"
                );
                SendResult::Success {
                    provider_message_id,
                }
            }
            Err(reason) => {
                match &reason {
                    DispatchError::TokenRejected => {
                        warn!(recipient = %cmd.recipient(), "Access token rejected; will refresh on next send")
                    }
                    other => error!(recipient = %cmd.recipient(), error = %other, "Email send failed"),
                }
                SendResult::Failure { reason }
            }
        }
    }
}
