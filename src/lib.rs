//! Mail Relay: chat messages in, Gmail out.
//!
//! A chat message is handed to a language model that extracts recipient,
//! subject and body as JSON. A valid extraction is sent through the Gmail
//! API with an OAuth access token that is refreshed on demand, and the
//! sender gets a one-line acknowledgment back in the same conversation.

pub mod auth;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod relay;
