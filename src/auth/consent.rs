//! One-time OAuth consent flow.
//!
//! Runs only when no refresh token is configured. A short-lived Axum server
//! listens on the redirect URI, exchanges the authorization code, hands the
//! token pair back and shuts down.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::auth::client::{OAuthClient, TokenEndpoint};
use crate::auth::token::TokenPair;
use crate::error::ConsentError;

/// How long to wait for the browser connection to drain after success.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// Shared state for the callback route.
#[derive(Clone)]
pub struct ConsentState {
    endpoint: Arc<dyn TokenEndpoint>,
    expected_state: String,
    done: Arc<Mutex<Option<oneshot::Sender<TokenPair>>>>,
}

impl ConsentState {
    pub fn new(
        endpoint: Arc<dyn TokenEndpoint>,
        expected_state: impl Into<String>,
        done: oneshot::Sender<TokenPair>,
    ) -> Self {
        Self {
            endpoint,
            expected_state: expected_state.into(),
            done: Arc::new(Mutex::new(Some(done))),
        }
    }
}

fn page(status: StatusCode, message: &str) -> (StatusCode, Html<String>) {
    (
        status,
        Html(format!("<html><body><h1>{message}</h1></body></html>")),
    )
}

/// GET {redirect path}?code=...&state=...
async fn handle_callback(
    State(state): State<ConsentState>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, Html<String>) {
    if let Some(err) = params.error {
        warn!(error = %err, "Consent denied");
        return page(StatusCode::BAD_REQUEST, "Authorization was denied.");
    }

    if params.state.as_deref() != Some(state.expected_state.as_str()) {
        warn!("Consent callback with unexpected state parameter");
        return page(StatusCode::BAD_REQUEST, "Invalid state parameter.");
    }

    let Some(code) = params.code.filter(|c| !c.is_empty()) else {
        return page(StatusCode::BAD_REQUEST, "No authorization code received.");
    };

    let pair = match state.endpoint.exchange_code(&code).await {
        Ok(pair) => pair,
        Err(e) => {
            error!(error = %e, "Authorization code exchange failed");
            return page(StatusCode::BAD_GATEWAY, "Token exchange failed. Please try again.");
        }
    };

    let sender = state
        .done
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .take();
    match sender {
        Some(tx) => {
            let _ = tx.send(pair);
            page(
                StatusCode::OK,
                "Authorization complete. You can close this window.",
            )
        }
        None => page(StatusCode::CONFLICT, "Authorization was already completed."),
    }
}

/// Build the callback router for `path`.
pub fn consent_routes(path: &str, state: ConsentState) -> Router {
    Router::new()
        .route(path, get(handle_callback))
        .with_state(state)
}

/// Serve the callback once and return the resulting token pair.
pub async fn run_consent_flow(client: Arc<OAuthClient>) -> Result<TokenPair, ConsentError> {
    let redirect_uri = client.redirect_uri().clone();
    let addr = listen_addr(&redirect_uri);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| ConsentError::Bind {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;

    let csrf_state = format!("mail-relay-{}", Uuid::new_v4());
    let auth_url = client.authorization_url(&csrf_state);

    let (token_tx, token_rx) = oneshot::channel();
    let endpoint: Arc<dyn TokenEndpoint> = client;
    let app = consent_routes(
        redirect_path(&redirect_uri),
        ConsentState::new(endpoint, csrf_state, token_tx),
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    info!(addr = %addr, "Waiting for OAuth consent callback");
    eprintln!("\n🔐 Gmail authorization required.");
    eprintln!("   Open this URL in a browser and grant access:\n");
    eprintln!("   {auth_url}\n");

    let pair = token_rx.await.map_err(|_| ConsentError::Aborted)?;

    let _ = shutdown_tx.send(());
    match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
        Ok(Ok(Err(e))) => return Err(ConsentError::Server(e.to_string())),
        Ok(Err(e)) => return Err(ConsentError::Server(e.to_string())),
        Ok(Ok(Ok(()))) | Err(_) => {}
    }

    info!("Consent flow complete");
    Ok(pair)
}

/// `host:port` to bind for a redirect URI.
pub fn listen_addr(redirect_uri: &Url) -> String {
    let host = redirect_uri.host_str().unwrap_or("localhost");
    let port = redirect_uri.port_or_known_default().unwrap_or(80);
    format!("{host}:{port}")
}

/// Route path of a redirect URI; `/` when it has none.
pub fn redirect_path(redirect_uri: &Url) -> &str {
    match redirect_uri.path() {
        "" => "/",
        path => path,
    }
}
