use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use secrecy::ExposeSecret;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use mail_relay::auth::{OAuthClient, TokenEndpoint, TokenManager, run_consent_flow};
use mail_relay::channels::{ChannelManager, CliChannel, TelegramChannel};
use mail_relay::config::{RelayConfig, StartupMode};
use mail_relay::error::Result;
use mail_relay::llm::create_provider;
use mail_relay::pipeline::{ConversationBridge, GmailDispatcher, IntentExtractor, MailDispatcher};
use mail_relay::relay::Relay;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RelayConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  Required: TELEGRAM_BOT_TOKEN, OPENAI_API_KEY, GOOGLE_CLIENT_ID,");
        eprintln!("            GOOGLE_CLIENT_SECRET, GOOGLE_REDIRECT_URI, SENDER_EMAIL");
        std::process::exit(1);
    });

    // Keep the guard alive so the file writer flushes on exit.
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📨 Mail Relay v{}", env!("CARGO_PKG_VERSION"));

    let oauth = Arc::new(OAuthClient::new(&config.oauth));

    match config.startup_mode() {
        StartupMode::RunConsentFlow => run_consent(oauth)
            .await
            .context("OAuth consent flow failed"),
        StartupMode::RunPipeline => run_pipeline(config, oauth)
            .await
            .context("relay stopped with an error"),
    }
}

fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mail-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

async fn run_consent(oauth: Arc<OAuthClient>) -> Result<()> {
    tracing::info!("No GOOGLE_REFRESH_TOKEN configured, starting consent flow");

    let pair = run_consent_flow(oauth).await?;

    eprintln!("\n✅ Gmail access granted.");
    eprintln!("   Store the refresh token and restart:\n");
    eprintln!(
        "   export GOOGLE_REFRESH_TOKEN={}\n",
        pair.refresh_token.expose_secret()
    );
    Ok(())
}

async fn run_pipeline(config: RelayConfig, oauth: Arc<OAuthClient>) -> Result<()> {
    let endpoint: Arc<dyn TokenEndpoint> = oauth;
    let tokens = Arc::new(TokenManager::new(
        endpoint,
        config.oauth.require_refresh_token()?,
    ));

    let llm = create_provider(&config.llm);
    let dispatcher: Arc<dyn MailDispatcher> =
        Arc::new(GmailDispatcher::new(tokens, config.sender_email.clone()));
    let bridge = Arc::new(ConversationBridge::new(IntentExtractor::new(llm), dispatcher));

    let mut channels = ChannelManager::new();
    channels.add(Box::new(TelegramChannel::new(
        config.telegram.bot_token.expose_secret().to_string(),
        config.telegram.allowed_users.clone(),
    )));
    if config.enable_cli {
        channels.add(Box::new(CliChannel::new()));
    }

    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Sender: {}", config.sender_email);
    eprintln!("   Channels: {}", channels.names().join(", "));
    if config.enable_cli {
        eprintln!("   Type a message and press Enter. Ctrl+C to exit.\n");
    }

    Relay::new(bridge, channels).run().await?;

    tracing::info!("Mail relay stopped");
    Ok(())
}
