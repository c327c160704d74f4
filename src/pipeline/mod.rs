//! Relay pipeline.
//!
//! Every chat message flows through:
//! 1. `IntentExtractor::extract()`: LLM turns free text into an `EmailCommand`
//! 2. `MailDispatcher::send()`: one Gmail send attempt with a fresh token
//! 3. `acknowledge()`: one reply to the originating conversation
//!
//! `ConversationBridge` owns the sequence. Nothing is sent without a fully
//! validated command.

pub mod bridge;
pub mod dispatcher;
pub mod envelope;
pub mod extractor;
pub mod types;

pub use bridge::{ConversationBridge, acknowledge};
pub use dispatcher::{GmailDispatcher, MailDispatcher};
pub use extractor::IntentExtractor;
pub use types::{ConversationContext, EmailCommand, Outcome, SendResult};
