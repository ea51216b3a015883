//! Integration tests for the oleg-web crate.
//!
//! Each test starts a real server on an ephemeral port with a pipeline
//! wired to a scripted LLM and a recording chat sender, then talks to it
//! over HTTP.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use oleg_agent::{
    ChatRequest, ChatSender, CommandHandler, Completion, CompletionBackend, DecisionEngine,
    LiveSettings, MentionDetector, Pipeline, PipelineParts, Responder, ResponderConfig, Result,
    Tunables, Usage,
};
use oleg_store::{QuotaTracker, SlidingWindowStore, StoreConfig};
use oleg_web::{AppState, WebConfig, WebServer};

const SECRET: &str = "hook-secret";
const BOT_ID: i64 = 999;

struct Scripted;

#[async_trait]
impl CompletionBackend for Scripted {
    async fn complete(&self, _request: &ChatRequest) -> Result<Completion> {
        Ok(Completion {
            text: "a witty reply".into(),
            usage: Usage::default(),
        })
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl ChatSender for RecordingSender {
    async fn send_message(&self, chat_id: i64, text: &str, _reply_to: Option<i64>) -> Result<i64> {
        let mut sent = self.sent.lock().unwrap();
        sent.push((chat_id, text.to_owned()));
        Ok(10_000 + sent.len() as i64)
    }

    async fn set_reaction(&self, _chat_id: i64, _message_id: i64, _emoji: &str) -> Result<()> {
        Ok(())
    }
}

struct TestServer {
    base: String,
    http: reqwest::Client,
    store: Arc<SlidingWindowStore>,
    sender: Arc<RecordingSender>,
}

async fn start(secret: Option<&str>) -> TestServer {
    let store = Arc::new(SlidingWindowStore::new(StoreConfig::default()).unwrap());
    let quota = Arc::new(QuotaTracker::default());
    let settings = LiveSettings::new(Tunables::default()).unwrap();
    let sender = Arc::new(RecordingSender::default());
    let responder = Arc::new(Responder::new(Arc::new(Scripted), ResponderConfig::default()));
    let engine = DecisionEngine::default();
    let commands = CommandHandler::new(
        Vec::<i64>::new(),
        settings.clone(),
        Arc::clone(&quota),
        Arc::clone(&store),
        Arc::clone(&responder),
        engine.react_heat_threshold(),
    );
    let pipeline = Arc::new(Pipeline::new(PipelineParts {
        store: Arc::clone(&store),
        quota: Arc::clone(&quota),
        settings: settings.clone(),
        engine,
        responder,
        commands,
        sender: Arc::clone(&sender) as Arc<dyn ChatSender>,
        mentions: MentionDetector::new(Some("oleg_bot"), &[]).unwrap(),
        bot_id: BOT_ID,
    }));

    let state = AppState::new(pipeline, Arc::clone(&store), quota, settings)
        .with_webhook_secret(secret.map(str::to_owned))
        .with_bot_id(BOT_ID);
    let server = WebServer::new(WebConfig::default(), state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server
            .serve(listener, std::future::pending())
            .await
            .unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        http: reqwest::Client::new(),
        store,
        sender,
    }
}

fn message_update(chat_id: i64, message_id: i64, text: &str) -> Value {
    json!({
        "update_id": message_id,
        "message": {
            "message_id": message_id,
            "from": { "id": 7, "is_bot": false, "first_name": "Ana" },
            "chat": { "id": chat_id, "type": "supergroup" },
            "date": chrono::Utc::now().timestamp(),
            "text": text
        }
    })
}

/// Wait for background processing to store `expected` messages.
async fn wait_for_window(store: &SlidingWindowStore, chat_id: i64, expected: usize) -> bool {
    for _ in 0..200 {
        if store.window(chat_id).await.len() >= expected {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ═══════════════════════════════════════════════════════════════════════
//  Configuration
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn web_config_defaults() {
    let config = WebConfig::default();
    assert_eq!(config.bind_addr, "0.0.0.0");
    assert_eq!(config.port, 8000);
}

// ═══════════════════════════════════════════════════════════════════════
//  Webhook
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn valid_update_is_acknowledged_and_processed() {
    let server = start(Some(SECRET)).await;
    let resp = server
        .http
        .post(format!("{}/webhook/telegram", server.base))
        .header("X-Telegram-Bot-Api-Secret-Token", SECRET)
        .json(&message_update(-100, 1, "hey @oleg_bot, thoughts?"))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!({ "status": "ok" }));

    // The mention is answered and the reply stored next to the message.
    assert!(wait_for_window(&server.store, -100, 2).await);
    let window = server.store.window(-100).await;
    assert_eq!(window[0].text, "hey @oleg_bot, thoughts?");
    assert!(window[0].mentions_bot);
    assert!(window[1].from_bot);
    assert_eq!(server.sender.sent.lock().unwrap()[0].1, "a witty reply");
}

#[tokio::test]
async fn wrong_secret_is_forbidden() {
    let server = start(Some(SECRET)).await;
    let resp = server
        .http
        .post(format!("{}/webhook/telegram", server.base))
        .header("X-Telegram-Bot-Api-Secret-Token", "guess")
        .json(&message_update(-100, 1, "hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let missing = server
        .http
        .post(format!("{}/webhook/telegram", server.base))
        .json(&message_update(-100, 2, "hello"))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), 403);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.store.chat_count(), 0);
}

#[tokio::test]
async fn malformed_payload_is_rejected_without_side_effects() {
    let server = start(None).await;
    let resp = server
        .http
        .post(format!("{}/webhook/telegram", server.base))
        .header("content-type", "application/json")
        .body("{ not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let wrong_shape = server
        .http
        .post(format!("{}/webhook/telegram", server.base))
        .json(&json!({ "message": "missing update id" }))
        .send()
        .await
        .unwrap();
    assert_eq!(wrong_shape.status(), 400);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.store.chat_count(), 0);
}

#[tokio::test]
async fn non_message_updates_are_acknowledged() {
    let server = start(None).await;
    let resp = server
        .http
        .post(format!("{}/webhook/telegram", server.base))
        .json(&json!({ "update_id": 5, "callback_query": { "id": "x" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let status: Value = server
        .http
        .get(format!("{}/api/status", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["webhook"]["ignored"], 1);
    assert_eq!(status["webhook"]["dispatched"], 0);
}

// ═══════════════════════════════════════════════════════════════════════
//  Health and status
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn health_and_root_respond() {
    let server = start(None).await;
    let health: Value = server
        .http
        .get(format!("{}/health", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");

    let root: Value = server
        .http
        .get(format!("{}/", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(root["message"], "Oleg is running");
}

#[tokio::test]
async fn status_reports_runtime_counters() {
    let server = start(None).await;
    server
        .http
        .post(format!("{}/webhook/telegram", server.base))
        .json(&message_update(-200, 1, "plain chatter"))
        .send()
        .await
        .unwrap();
    assert!(wait_for_window(&server.store, -200, 1).await);

    let status: Value = server
        .http
        .get(format!("{}/api/status", server.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(status["status"], "ok");
    assert_eq!(status["model"], "scripted");
    assert_eq!(status["tunables"]["gap_min_seconds"], 20);
    assert_eq!(status["store"]["active_chats"], 1);
    assert_eq!(status["webhook"]["dispatched"], 1);
    assert!(status["quota"]["ratio"].is_number());
}
