//! Stub provider server shared by the integration tests.
//!
//! One Axum app on a random port plays all three upstreams: the chat
//! completions API, Google's token endpoint and the Gmail send endpoint.
//! Behaviour is scripted through [`StubState`]; every request is recorded.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Form, Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use url::Url;

use mail_relay::auth::{OAuthClient, TokenEndpoint, TokenManager};
use mail_relay::channels::{Channel, MessageStream, OutgoingResponse};
use mail_relay::config::OAuthConfig;
use mail_relay::error::ChannelError;
use mail_relay::pipeline::GmailDispatcher;
use secrecy::SecretString;

/// Maximum time any test is allowed to run before we consider it hung.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A recorded Gmail send request.
#[derive(Debug, Clone)]
pub struct GmailRequest {
    pub authorization: Option<String>,
    pub raw: String,
}

#[derive(Default)]
pub struct StubState {
    /// Assistant message content returned by the completions endpoint.
    pub completion_content: Mutex<String>,
    /// Non-200 status for the completions endpoint.
    pub completion_failure: Mutex<Option<u16>>,
    /// Non-200 status for the token endpoint.
    pub token_failure: Mutex<Option<u16>>,
    /// Leave `refresh_token` out of authorization-code responses.
    pub omit_refresh_token: Mutex<bool>,
    /// Statuses for successive Gmail sends; 200 once exhausted.
    pub gmail_statuses: Mutex<VecDeque<u16>>,

    pub completion_requests: Mutex<Vec<(Option<String>, Value)>>,
    pub token_requests: Mutex<Vec<HashMap<String, String>>>,
    pub gmail_requests: Mutex<Vec<GmailRequest>>,
    issued_tokens: AtomicUsize,
}

impl StubState {
    pub fn reply_with(&self, content: &str) {
        *self.completion_content.lock().unwrap() = content.to_string();
    }

    pub fn queue_gmail_statuses(&self, statuses: &[u16]) {
        self.gmail_statuses.lock().unwrap().extend(statuses);
    }

    pub fn token_calls(&self) -> usize {
        self.token_requests.lock().unwrap().len()
    }

    pub fn gmail_calls(&self) -> usize {
        self.gmail_requests.lock().unwrap().len()
    }

    pub fn completion_calls(&self) -> usize {
        self.completion_requests.lock().unwrap().len()
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap()
}

async fn completions(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state
        .completion_requests
        .lock()
        .unwrap()
        .push((bearer(&headers), body));

    if let Some(code) = *state.completion_failure.lock().unwrap() {
        return (
            status(code),
            Json(json!({"error": {"message": "upstream overloaded", "type": "server_error"}})),
        );
    }

    let content = state.completion_content.lock().unwrap().clone();
    (
        StatusCode::OK,
        Json(json!({
            "id": "chatcmpl-stub",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 42, "completion_tokens": 17, "total_tokens": 59}
        })),
    )
}

async fn token(
    State(state): State<Arc<StubState>>,
    Form(params): Form<HashMap<String, String>>,
) -> (StatusCode, Json<Value>) {
    let grant_type = params.get("grant_type").cloned().unwrap_or_default();
    state.token_requests.lock().unwrap().push(params);

    if let Some(code) = *state.token_failure.lock().unwrap() {
        return (
            status(code),
            Json(json!({
                "error": "invalid_grant",
                "error_description": "Token has been expired or revoked."
            })),
        );
    }

    let n = state.issued_tokens.fetch_add(1, Ordering::SeqCst) + 1;
    let mut body = json!({
        "access_token": format!("ya29.stub-{n}"),
        "expires_in": 3599,
        "token_type": "Bearer",
        "scope": "https://www.googleapis.com/auth/gmail.send"
    });
    if grant_type == "authorization_code" && !*state.omit_refresh_token.lock().unwrap() {
        body["refresh_token"] = json!("1//stub-refresh");
    }
    (StatusCode::OK, Json(body))
}

async fn gmail_send(
    State(state): State<Arc<StubState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let raw = body["raw"].as_str().unwrap_or_default().to_string();
    let n = {
        let mut requests = state.gmail_requests.lock().unwrap();
        requests.push(GmailRequest {
            authorization: bearer(&headers),
            raw,
        });
        requests.len()
    };

    let code = state.gmail_statuses.lock().unwrap().pop_front().unwrap_or(200);
    match code {
        200 => (
            StatusCode::OK,
            Json(json!({
                "id": format!("18c0000000000{n:03}"),
                "threadId": format!("18c0000000000{n:03}"),
                "labelIds": ["SENT"]
            })),
        ),
        401 => (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"code": 401, "message": "Invalid Credentials"}})),
        ),
        other => (
            status(other),
            Json(json!({"error": {"code": other, "message": "Backend Error"}})),
        ),
    }
}

/// Start the stub on a random port; returns its base URL and state.
pub async fn start_stub() -> (String, Arc<StubState>) {
    let state = Arc::new(StubState::default());
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .route("/token", post(token))
        .route("/gmail/v1/users/me/messages/send", post(gmail_send))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    (format!("http://127.0.0.1:{port}"), state)
}

// ── Wiring helpers ──────────────────────────────────────────────────

pub fn oauth_client(base: &str) -> OAuthClient {
    OAuthClient::new(&OAuthConfig {
        client_id: "client-123.apps.googleusercontent.com".into(),
        client_secret: SecretString::from("shh"),
        redirect_uri: Url::parse("http://localhost:3000/oauth2callback").unwrap(),
        refresh_token: Some(SecretString::from("1//configured-refresh")),
    })
    .with_token_url(format!("{base}/token"))
}

pub fn token_manager(base: &str) -> Arc<TokenManager> {
    let endpoint: Arc<dyn TokenEndpoint> = Arc::new(oauth_client(base));
    Arc::new(TokenManager::new(
        endpoint,
        SecretString::from("1//configured-refresh"),
    ))
}

pub fn gmail_dispatcher(base: &str, tokens: Arc<TokenManager>) -> GmailDispatcher {
    GmailDispatcher::new(tokens, "me@example.com").with_base_url(base)
}

/// Channel that records every reply.
#[derive(Default)]
pub struct RecordingChannel {
    pub replies: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    pub fn replies(&self) -> Vec<(String, String)> {
        self.replies.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        Ok(Box::pin(futures::stream::empty()))
    }

    async fn send(
        &self,
        conversation_id: &str,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.replies
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), response.content));
        Ok(())
    }
}
