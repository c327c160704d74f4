//! Conversation bridge: one chat message in, one acknowledgment out.

use std::sync::Arc;

use tracing::{info, warn};

use crate::channels::{Channel, OutgoingResponse};
use crate::pipeline::dispatcher::MailDispatcher;
use crate::pipeline::extractor::IntentExtractor;
use crate::pipeline::types::{ConversationContext, Outcome, SendResult};

pub const EXTRACTION_FAILED_ACK: &str = "Sorry, I could not extract email details from that message. \
     Tell me who to email, the subject and what to say.";

pub const SEND_FAILED_ACK: &str = "Sorry, the email could not be sent. Please try again later.";

/// The reply text for an outcome. Failure replies carry no internal detail.
pub fn acknowledge(outcome: &Outcome) -> String {
    match outcome {
        Outcome::NotExtracted => EXTRACTION_FAILED_ACK.to_string(),
        Outcome::Sent { recipient } => format!("Email sent to {recipient}."),
        Outcome::SendFailed { .. } => SEND_FAILED_ACK.to_string(),
    }
}

/// Wires extraction and dispatch together for each message.
pub struct ConversationBridge {
    extractor: IntentExtractor,
    dispatcher: Arc<dyn MailDispatcher>,
}

impl ConversationBridge {
    pub fn new(extractor: IntentExtractor, dispatcher: Arc<dyn MailDispatcher>) -> Self {
        Self {
            extractor,
            dispatcher,
        }
    }

    /// Extract, send at most once, and report what happened.
    pub async fn process(&self, raw_text: &str) -> Outcome {
        let Some(cmd) = self.extractor.extract(raw_text).await else {
            return Outcome::NotExtracted;
        };

        let recipient = cmd.recipient().to_string();
        match self.dispatcher.send(cmd).await {
            SendResult::Success { .. } => Outcome::Sent { recipient },
            SendResult::Failure { .. } => Outcome::SendFailed { recipient },
        }
    }

    /// Handle one message and reply on `channel`.
    ///
    /// A reply that cannot be delivered is logged and dropped.
    pub async fn on_message(&self, ctx: &ConversationContext, channel: &dyn Channel) {
        info!(
            channel = %channel.name(),
            conversation_id = %ctx.conversation_id,
            "Processing message"
        );

        let outcome = self.process(&ctx.raw_text).await;
        info!(
            conversation_id = %ctx.conversation_id,
            outcome = outcome.label(),
            "Message processed"
        );

        let reply = OutgoingResponse::text(acknowledge(&outcome));
        if let Err(e) = channel.send(&ctx.conversation_id, reply).await {
            warn!(
                conversation_id = %ctx.conversation_id,
                error = %e,
                "Failed to deliver acknowledgment"
            );
        }
    }
}
