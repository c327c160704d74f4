//! Main relay loop: channels in, one bridge task per message.

use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinSet;

use crate::channels::ChannelManager;
use crate::error::Error;
use crate::pipeline::{ConversationBridge, ConversationContext};

pub struct Relay {
    bridge: Arc<ConversationBridge>,
    channels: Arc<ChannelManager>,
}

impl Relay {
    pub fn new(bridge: Arc<ConversationBridge>, channels: ChannelManager) -> Self {
        Self {
            bridge,
            channels: Arc::new(channels),
        }
    }

    /// Run until Ctrl+C or until every channel stream has ended.
    pub async fn run(self) -> Result<(), Error> {
        self.run_until(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Ctrl+C received, shutting down...");
        })
        .await
    }

    /// Run until `shutdown` completes or every channel stream has ended.
    ///
    /// Messages already being processed are allowed to finish.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), Error>
    where
        F: Future<Output = ()> + Send,
    {
        self.channels.health_check_all().await?;
        let mut message_stream = self.channels.start_all().await?;

        tracing::info!(channels = ?self.channels.names(), "Relay ready and listening");

        let mut in_flight = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            let message = tokio::select! {
                biased;
                () = &mut shutdown => break,
                msg = message_stream.next() => match msg {
                    Some(m) => m,
                    None => {
                        tracing::info!("All channel streams ended");
                        break;
                    }
                },
            };

            let Some(channel) = self.channels.get(&message.channel) else {
                tracing::warn!(channel = %message.channel, "Message from unknown channel dropped");
                continue;
            };

            tracing::debug!(
                message_id = %message.id,
                channel = %message.channel,
                user_id = %message.user_id,
                "Message received"
            );

            let ctx = ConversationContext::from(&message);
            let bridge = Arc::clone(&self.bridge);
            in_flight.spawn(async move {
                bridge.on_message(&ctx, channel.as_ref()).await;
            });

            while let Some(done) = in_flight.try_join_next() {
                if let Err(e) = done {
                    tracing::error!(error = %e, "Message task panicked");
                }
            }
        }

        while let Some(done) = in_flight.join_next().await {
            if let Err(e) = done {
                tracing::error!(error = %e, "Message task panicked");
            }
        }

        self.channels.shutdown_all().await;
        Ok(())
    }
}
