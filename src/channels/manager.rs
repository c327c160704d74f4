//! Owns the configured channels and merges their inbound streams.

use std::sync::Arc;

use futures::stream::select_all;

use crate::channels::{Channel, MessageStream};
use crate::error::ChannelError;

#[derive(Default)]
pub struct ChannelManager {
    channels: Vec<Arc<dyn Channel>>,
}

impl ChannelManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, channel: Box<dyn Channel>) {
        tracing::debug!(channel = %channel.name(), "Registered channel");
        self.channels.push(Arc::from(channel));
    }

    /// Look a channel up by [`Channel::name`].
    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.iter().find(|c| c.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Fail on the first channel that is not reachable.
    pub async fn health_check_all(&self) -> Result<(), ChannelError> {
        for channel in &self.channels {
            channel.health_check().await?;
        }
        Ok(())
    }

    /// Start every channel and merge the streams into one.
    pub async fn start_all(&self) -> Result<MessageStream, ChannelError> {
        let mut streams = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            streams.push(channel.start().await?);
            tracing::info!(channel = %channel.name(), "Channel started");
        }
        Ok(Box::pin(select_all(streams)))
    }

    /// Shut every channel down; failures are logged and skipped.
    pub async fn shutdown_all(&self) {
        for channel in &self.channels {
            if let Err(e) = channel.shutdown().await {
                tracing::warn!(channel = %channel.name(), error = %e, "Channel shutdown failed");
            }
        }
    }
}
