//! Shared types for the relay pipeline.

use std::sync::LazyLock;

use regex::Regex;

use crate::channels::IncomingMessage;
use crate::error::{DispatchError, ExtractionError};

/// Minimal address syntax: `local@domain.tld`, no whitespace, brackets,
/// separators or control characters.
static EMAIL_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@<>,;\p{Cc}]+@[^\s@<>,;\p{Cc}]+\.[^\s@<>,;\p{Cc}]+$").unwrap()
});

/// Whether `address` looks like a single plain email address.
pub fn is_email_address(address: &str) -> bool {
    EMAIL_ADDRESS.is_match(address)
}

// ── Email command ───────────────────────────────────────────────────

/// A validated request to send one plain-text email.
///
/// Only the extractor builds these. All three fields are non-empty and the
/// recipient passes [`is_email_address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailCommand {
    recipient: String,
    subject: String,
    body: String,
}

impl EmailCommand {
    pub fn new(
        recipient: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Result<Self, ExtractionError> {
        let recipient = recipient.into().trim().to_string();
        let subject = subject.into();
        let body = body.into();

        if recipient.is_empty() {
            return Err(ExtractionError::MissingField("email"));
        }
        if subject.trim().is_empty() {
            return Err(ExtractionError::MissingField("subject"));
        }
        if body.trim().is_empty() {
            return Err(ExtractionError::MissingField("body"));
        }
        if !is_email_address(&recipient) {
            return Err(ExtractionError::InvalidRecipient(recipient));
        }

        Ok(Self {
            recipient,
            subject,
            body,
        })
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

// ── Conversation context ────────────────────────────────────────────

/// One inbound chat message, reduced to what the pipeline needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationContext {
    /// Where the acknowledgment goes (Telegram chat id, CLI session, ...).
    pub conversation_id: String,
    pub raw_text: String,
}

impl ConversationContext {
    pub fn new(conversation_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            raw_text: raw_text.into(),
        }
    }
}

impl From<&IncomingMessage> for ConversationContext {
    fn from(msg: &IncomingMessage) -> Self {
        Self::new(&msg.conversation_id, &msg.content)
    }
}

// ── Outcomes ────────────────────────────────────────────────────────

/// Terminal result of one dispatch attempt.
#[derive(Debug)]
pub enum SendResult {
    Success { provider_message_id: String },
    Failure { reason: DispatchError },
}

impl SendResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// What happened to one chat message, as far as the user is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The model output did not yield a command; nothing was sent.
    NotExtracted,
    /// The provider accepted the email.
    Sent { recipient: String },
    /// Extraction worked but the send failed.
    SendFailed { recipient: String },
}

impl Outcome {
    /// Short label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotExtracted => "not_extracted",
            Self::Sent { .. } => "sent",
            Self::SendFailed { .. } => "send_failed",
        }
    }
}
