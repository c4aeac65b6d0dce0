//! Integration test: run the Telegram channel against a fake Bot API served by axum.

use async_trait::async_trait;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use deskrelay::alert::AlertSink;
use deskrelay::channels::{Action, ChannelHandle, ChatEvent, OutgoingMessage, TelegramChannel};
use deskrelay::config::Config;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TOKEN: &str = "test-token";
/// Accepted by getMe, but getUpdates answers 409 as when a webhook is set.
const CONFLICT_TOKEN: &str = "conflict-token";

#[derive(Clone, Default)]
struct FakeApi {
    sent: Arc<Mutex<Vec<Value>>>,
    answered: Arc<Mutex<Vec<Value>>>,
    offsets: Arc<Mutex<Vec<Option<String>>>>,
    polls: Arc<AtomicUsize>,
    conflict_polls: Arc<AtomicUsize>,
}

#[derive(Default)]
struct RecordingAlerts {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn alert(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

async fn get_me() -> Json<Value> {
    Json(json!({ "ok": true, "result": { "id": 1, "is_bot": true, "username": "relay_bot" } }))
}

async fn send_message(State(api): State<FakeApi>, Json(body): Json<Value>) -> Json<Value> {
    api.sent.lock().unwrap().push(body);
    Json(json!({ "ok": true, "result": { "message_id": 1 } }))
}

async fn answer_callback_query(State(api): State<FakeApi>, Json(body): Json<Value>) -> Json<Value> {
    api.answered.lock().unwrap().push(body);
    Json(json!({ "ok": true, "result": true }))
}

async fn get_updates(
    State(api): State<FakeApi>,
    Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
    api.offsets.lock().unwrap().push(query.get("offset").cloned());
    if api.polls.fetch_add(1, Ordering::SeqCst) == 0 {
        return Json(json!({ "ok": true, "result": [
            { "update_id": 100, "message": { "message_id": 5, "chat": { "id": -1001 }, "text": "hello" } },
            { "update_id": 101, "callback_query": {
                "id": "cb-1",
                "from": { "id": 77 },
                "message": { "message_id": 6, "chat": { "id": -1001 } },
                "data": "user-42"
            } },
            { "update_id": 102, "edited_message": { "message_id": 5, "chat": { "id": -1001 }, "text": "hello!" } }
        ] }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    Json(json!({ "ok": true, "result": [] }))
}

async fn conflicting_get_updates(
    State(api): State<FakeApi>,
) -> (axum::http::StatusCode, Json<Value>) {
    api.conflict_polls.fetch_add(1, Ordering::SeqCst);
    (
        axum::http::StatusCode::CONFLICT,
        Json(json!({
            "ok": false,
            "error_code": 409,
            "description": "Conflict: can't use getUpdates method while webhook is active"
        })),
    )
}

async fn unauthorized() -> (axum::http::StatusCode, Json<Value>) {
    (
        axum::http::StatusCode::UNAUTHORIZED,
        Json(json!({ "ok": false, "description": "Unauthorized" })),
    )
}

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

async fn start_fake_api() -> (String, FakeApi) {
    let api = FakeApi::default();
    let prefix = format!("/bot{}", TOKEN);
    let app = Router::new()
        .route(&format!("{}/getMe", prefix), get(get_me))
        .route(&format!("{}/sendMessage", prefix), post(send_message))
        .route(&format!("{}/answerCallbackQuery", prefix), post(answer_callback_query))
        .route(&format!("{}/getUpdates", prefix), get(get_updates))
        .route(&format!("/bot{}/getMe", CONFLICT_TOKEN), get(get_me))
        .route(
            &format!("/bot{}/getUpdates", CONFLICT_TOKEN),
            get(conflicting_get_updates),
        )
        .route("/botbad-token/getMe", get(unauthorized))
        .with_state(api.clone());
    let port = free_port();
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
        .await
        .expect("bind fake api");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://127.0.0.1:{}/", port), api)
}

#[tokio::test]
async fn get_me_accepts_valid_token_and_rejects_bad_one() {
    let (base, _api) = start_fake_api().await;

    let channel = TelegramChannel::new(TOKEN, &base, None, 1).unwrap();
    let me = channel.get_me().await.expect("getMe");
    assert_eq!(me.username.as_deref(), Some("relay_bot"));

    let bad = TelegramChannel::new("bad-token", &base, None, 1).unwrap();
    let err = bad.get_me().await.unwrap_err();
    assert!(err.to_string().contains("getMe failed"));
}

#[tokio::test]
async fn send_message_posts_inline_keyboard() {
    let (base, api) = start_fake_api().await;
    let channel = TelegramChannel::new(TOKEN, &base, None, 1).unwrap();

    let message = OutgoingMessage::text(-1001, "New message\nID: r1\nMessage: help")
        .with_actions(vec![Action::new("Reply", "r1"), Action::new("Close", "none")]);
    ChannelHandle::send_message(&channel, &message)
        .await
        .expect("sendMessage");

    let sent = api.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["chat_id"], -1001);
    assert_eq!(sent[0]["text"], "New message\nID: r1\nMessage: help");
    assert_eq!(
        sent[0]["reply_markup"]["inline_keyboard"],
        json!([[
            { "text": "Reply", "callback_data": "r1" },
            { "text": "Close", "callback_data": "none" }
        ]])
    );
}

#[tokio::test]
async fn long_poll_converts_updates_and_advances_offset() {
    let (base, api) = start_fake_api().await;
    let channel = Arc::new(TelegramChannel::new(TOKEN, &base, None, 1).unwrap());
    let (tx, mut rx) = tokio::sync::mpsc::channel(8);

    let alerts = Arc::new(RecordingAlerts::default());
    let handle = channel.clone().start_inbound(tx, alerts.clone());

    let mut events = Vec::new();
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("event within 5s")
            .expect("channel open");
        events.push(event);
    }
    assert_eq!(
        events,
        vec![
            ChatEvent::TextMessage {
                chat_id: -1001,
                text: "hello".to_string()
            },
            ChatEvent::FocusSelection {
                chat_id: -1001,
                token: "user-42".to_string()
            },
            ChatEvent::Empty { update_id: 102 },
        ]
    );

    // Wait for the follow-up poll carrying the acknowledged offset.
    for _ in 0..100 {
        if api.polls.load(Ordering::SeqCst) >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    channel.stop();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops after stop()")
        .expect("loop task");

    let offsets = api.offsets.lock().unwrap().clone();
    assert_eq!(offsets[0], None);
    assert_eq!(offsets[1].as_deref(), Some("103"));
    let answered = api.answered.lock().unwrap().clone();
    assert_eq!(answered, vec![json!({ "callback_query_id": "cb-1" })]);
    assert!(alerts.messages.lock().unwrap().is_empty());
}

#[tokio::test]
async fn check_updates_fails_when_get_updates_is_refused() {
    let (base, _api) = start_fake_api().await;

    let channel = TelegramChannel::new(CONFLICT_TOKEN, &base, None, 1).unwrap();
    channel.get_me().await.expect("getMe");
    let err = channel.check_updates().await.unwrap_err();
    assert!(err.to_string().contains("getUpdates failed: 409"));

    let healthy = TelegramChannel::new(TOKEN, &base, None, 1).unwrap();
    healthy.check_updates().await.expect("getUpdates");
}

#[tokio::test]
async fn refused_polls_alert_once_and_stop_on_request() {
    let (base, api) = start_fake_api().await;
    let channel = Arc::new(TelegramChannel::new(CONFLICT_TOKEN, &base, None, 1).unwrap());
    let (tx, _rx) = tokio::sync::mpsc::channel(8);
    let alerts = Arc::new(RecordingAlerts::default());

    let handle = channel.clone().start_inbound(tx, alerts.clone());

    // Two refused polls are two seconds apart; only the first is alerted.
    for _ in 0..250 {
        if api.conflict_polls.load(Ordering::SeqCst) >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(api.conflict_polls.load(Ordering::SeqCst) >= 2);
    let messages = alerts.messages.lock().unwrap().clone();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].starts_with("telegram getUpdates error"));
    assert!(messages[0].contains("409"));

    channel.stop();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("loop stops during back-off")
        .expect("loop task");
}

#[tokio::test]
async fn relay_refuses_to_start_when_updates_are_refused() {
    if std::env::var("TELEGRAM_BOT_TOKEN").is_ok() || std::env::var("TELEGRAM_CHAT_ID").is_ok() {
        return;
    }
    let (base, api) = start_fake_api().await;
    let mut config = Config::default();
    config.channels.telegram.bot_token = Some(CONFLICT_TOKEN.to_string());
    config.channels.telegram.chat_id = Some(-1001);
    config.channels.telegram.api_base = base;

    let err = tokio::time::timeout(Duration::from_secs(10), deskrelay::gateway::run_relay(config))
        .await
        .expect("startup fails promptly")
        .unwrap_err();
    assert!(format!("{:#}", err).contains("error reading telegram updates"));
    assert_eq!(api.conflict_polls.load(Ordering::SeqCst), 1);
}
