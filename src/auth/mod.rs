//! OAuth token lifecycle for the mail provider.

pub mod client;
pub mod consent;
pub mod manager;
pub mod token;

pub use client::{OAuthClient, TokenEndpoint};
pub use consent::run_consent_flow;
pub use manager::TokenManager;
pub use token::{AccessToken, TokenGrant, TokenPair};
