//! Intent extractor: chat text → [`EmailCommand`] via the language model.
//!
//! The model output is untrusted free text. Extraction is two pure stages:
//! [`locate_json_object`] finds a candidate, [`parse_command`] validates it.
//! Any failure along the way yields `None`; nothing is thrown upward.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ExtractionError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::types::EmailCommand;

/// Low temperature: we want the same JSON for the same message.
const EXTRACTION_TEMPERATURE: f32 = 0.2;

/// Enough room for a subject and a few paragraphs of body.
const EXTRACTION_MAX_TOKENS: u32 = 1024;

/// Turns raw chat text into an email command.
pub struct IntentExtractor {
    llm: Arc<dyn LlmProvider>,
}

impl IntentExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Extract a command, or `None` if the message does not yield one.
    pub async fn extract(&self, raw_text: &str) -> Option<EmailCommand> {
        match self.try_extract(raw_text).await {
            Ok(cmd) => {
                debug!(recipient = %cmd.recipient(), "Extracted email command");
                Some(cmd)
            }
            Err(e) => {
                warn!(error = %e, "Could not extract email command");
                None
            }
        }
    }

    /// Like [`extract`](Self::extract) but says why it failed.
    pub async fn try_extract(&self, raw_text: &str) -> Result<EmailCommand, ExtractionError> {
        let response = self.llm.complete(build_request(raw_text)).await?;
        let candidate =
            locate_json_object(&response.content).ok_or(ExtractionError::NoJsonObject)?;
        parse_command(candidate)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_system_prompt() -> String {
    "You turn chat messages into outgoing emails.\n\n\
     Respond with ONLY a JSON object with exactly these keys:\n\
     {\"email\": \"recipient address\", \"subject\": \"short subject line\", \"body\": \"plain-text email body\"}\n\n\
     Rules:\n\
     - Use the recipient address exactly as written in the message\n\
     - Write the body as the email itself, not as a description of it\n\
     - No markdown, no code fences, no commentary\n\
     - If the message does not say who to email, respond with {}"
        .to_string()
}

/// One worked example so the model sees the exact output shape.
const EXAMPLE_REQUEST: &str = "Email alice@example.com and tell her the report is ready for review";
const EXAMPLE_REPLY: &str = r#"{"email": "alice@example.com", "subject": "Report ready for review", "body": "Hi Alice,\n\nThe report is ready for your review.\n\nThanks"}"#;

/// Completion request for one chat message.
pub fn build_request(raw_text: &str) -> CompletionRequest {
    CompletionRequest::new(vec![
        ChatMessage::system(build_system_prompt()),
        ChatMessage::user(EXAMPLE_REQUEST),
        ChatMessage::assistant(EXAMPLE_REPLY),
        ChatMessage::user(raw_text),
    ])
    .with_temperature(EXTRACTION_TEMPERATURE)
    .with_max_tokens(EXTRACTION_MAX_TOKENS)
}

// ── Response parsing ────────────────────────────────────────────────

/// Find the first brace-delimited JSON object in `text`.
///
/// Starts at the first `{` and returns the shortest span whose braces
/// balance, skipping braces inside JSON strings. Prose around the object and
/// any later fragments are ignored. Returns `None` if there is no `{` or it
/// never balances.
pub fn locate_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse a candidate object into a command.
pub fn parse_command(json: &str) -> Result<EmailCommand, ExtractionError> {
    let value: Value = serde_json::from_str(json)?;

    let field = |name: &'static str| -> Result<&str, ExtractionError> {
        value
            .get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .ok_or(ExtractionError::MissingField(name))
    };

    EmailCommand::new(field("email")?, field("subject")?, field("body")?)
}
