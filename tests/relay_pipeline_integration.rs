//! End-to-end tests: chat message → completion API → Gmail → acknowledgment.
//!
//! The real provider, OAuth client and dispatcher talk to the stub server;
//! replies are captured by a recording channel.

mod common;

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use secrecy::SecretString;
use tokio::time::timeout;

use mail_relay::llm::{LlmProvider, OpenAiCompatProvider};
use mail_relay::pipeline::bridge::{EXTRACTION_FAILED_ACK, SEND_FAILED_ACK};
use mail_relay::pipeline::{ConversationBridge, ConversationContext, IntentExtractor};

use common::{
    RecordingChannel, StubState, TEST_TIMEOUT, gmail_dispatcher, start_stub, token_manager,
};

const BOB_REPLY: &str = "Sure! Here's the email:\n\
    {\"email\": \"bob@example.com\", \"subject\": \"Meeting update\", \"body\": \"Hi Bob,\\n\\nThe meeting moved to 3pm.\"}\n\
    Let me know if you want changes.";

fn provider(base: &str) -> OpenAiCompatProvider {
    OpenAiCompatProvider::new(
        SecretString::from("sk-test"),
        format!("{base}/v1"),
        "gpt-4o-mini",
    )
}

fn bridge(base: &str) -> ConversationBridge {
    ConversationBridge::new(
        IntentExtractor::new(Arc::new(provider(base))),
        Arc::new(gmail_dispatcher(base, token_manager(base))),
    )
}

async fn relay_one(base: &str, text: &str) -> Vec<(String, String)> {
    let channel = RecordingChannel::default();
    bridge(base)
        .on_message(&ConversationContext::new("chat-1", text), &channel)
        .await;
    channel.replies()
}

fn sent_envelopes(stub: &StubState) -> Vec<String> {
    stub.gmail_requests
        .lock()
        .unwrap()
        .iter()
        .map(|r| String::from_utf8(URL_SAFE_NO_PAD.decode(&r.raw).unwrap()).unwrap())
        .collect()
}

// ── Completion provider ──────────────────────────────────────────────

#[tokio::test]
async fn provider_sends_model_messages_and_auth() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start_stub().await;
        stub.reply_with("hello");

        let request = mail_relay::pipeline::extractor::build_request("email bob");
        let response = provider(&base).complete(request).await.unwrap();

        assert_eq!(response.content, "hello");
        assert_eq!(response.input_tokens, 42);
        assert_eq!(response.output_tokens, 17);
        assert_eq!(response.response_id.as_deref(), Some("chatcmpl-stub"));

        let requests = stub.completion_requests.lock().unwrap();
        let (auth, body) = &requests[0];
        assert_eq!(auth.as_deref(), Some("Bearer sk-test"));
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][2]["role"], "assistant");
        assert_eq!(body["messages"][3]["role"], "user");
        assert_eq!(body["messages"][3]["content"], "email bob");
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    })
    .await
    .expect("test timed out");
}

// ── Full relay ───────────────────────────────────────────────────────

#[tokio::test]
async fn bob_message_is_sent_and_confirmed() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start_stub().await;
        stub.reply_with(BOB_REPLY);

        let replies = relay_one(
            &base,
            "Send an email to bob@example.com telling him the meeting moved to 3pm",
        )
        .await;

        let envelopes = sent_envelopes(&stub);
        assert_eq!(envelopes.len(), 1);
        assert!(envelopes[0].contains("To: bob@example.com\r\n"));
        assert!(envelopes[0].contains("Subject: Meeting update\r\n"));
        assert!(envelopes[0].ends_with("Hi Bob,\r\n\r\nThe meeting moved to 3pm."));

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].0, "chat-1");
        assert!(replies[0].1.contains("bob@example.com"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn prose_only_reply_never_touches_gmail_or_tokens() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start_stub().await;
        stub.reply_with("I'm not sure who you'd like me to email. Could you clarify?");

        let replies = relay_one(&base, "let's talk later").await;

        assert_eq!(stub.completion_calls(), 1);
        assert_eq!(stub.token_calls(), 0);
        assert_eq!(stub.gmail_calls(), 0);
        assert_eq!(replies, vec![("chat-1".to_string(), EXTRACTION_FAILED_ACK.to_string())]);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_field_is_an_extraction_failure() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start_stub().await;
        stub.reply_with(r#"{"email": "bob@example.com", "subject": "Meeting update"}"#);

        let replies = relay_one(&base, "email bob").await;

        assert_eq!(stub.gmail_calls(), 0);
        assert_eq!(replies[0].1, EXTRACTION_FAILED_ACK);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn completion_outage_is_an_extraction_failure() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start_stub().await;
        *stub.completion_failure.lock().unwrap() = Some(503);

        let replies = relay_one(&base, "email bob@example.com hi").await;

        assert_eq!(stub.gmail_calls(), 0);
        assert_eq!(replies[0].1, EXTRACTION_FAILED_ACK);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn gmail_failure_yields_generic_ack() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start_stub().await;
        stub.reply_with(BOB_REPLY);
        stub.queue_gmail_statuses(&[500]);

        let replies = relay_one(&base, "email bob").await;

        assert_eq!(stub.gmail_calls(), 1);
        assert_eq!(replies[0].1, SEND_FAILED_ACK);
        assert!(!replies[0].1.contains("Backend Error"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn revoked_refresh_token_yields_generic_ack() {
    timeout(TEST_TIMEOUT, async {
        let (base, stub) = start_stub().await;
        stub.reply_with(BOB_REPLY);
        *stub.token_failure.lock().unwrap() = Some(400);

        let replies = relay_one(&base, "email bob").await;

        assert_eq!(stub.gmail_calls(), 0);
        assert_eq!(replies[0].1, SEND_FAILED_ACK);
    })
    .await
    .expect("test timed out");
}
