//! Telegram channel: long-poll getUpdates and sendMessage via Bot API.

use crate::alert::{self, AlertSink};
use crate::channels::event::ChatEvent;
use crate::channels::handle::{ChannelHandle, OutgoingMessage, SendError};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

const SEND_TIMEOUT: Duration = Duration::from_secs(30);
const POLL_RETRY_DELAY: Duration = Duration::from_secs(2);
const ALLOWED_UPDATES: &str = r#"["message","callback_query"]"#;

/// Bot API envelope: `{ ok, result, description }`.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram update payload (getUpdates result item).
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// Inline button press.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramCallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    /// Message the pressed button was attached to.
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

impl From<TelegramUpdate> for ChatEvent {
    fn from(update: TelegramUpdate) -> Self {
        if let Some(msg) = update.message {
            if let Some(text) = msg.text {
                return ChatEvent::TextMessage {
                    chat_id: msg.chat.id,
                    text,
                };
            }
        } else if let Some(query) = update.callback_query {
            if let Some(token) = query.data {
                let chat_id = query.message.map(|m| m.chat.id).unwrap_or(query.from.id);
                return ChatEvent::FocusSelection { chat_id, token };
            }
        }
        ChatEvent::Empty {
            update_id: update.update_id,
        }
    }
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: Vec<Vec<InlineKeyboardButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

impl<'a> From<&'a OutgoingMessage> for SendMessageRequest<'a> {
    fn from(message: &'a OutgoingMessage) -> Self {
        // All actions go on a single keyboard row.
        let reply_markup = if message.actions.is_empty() {
            None
        } else {
            Some(InlineKeyboardMarkup {
                inline_keyboard: vec![message
                    .actions
                    .iter()
                    .map(|a| InlineKeyboardButton {
                        text: &a.label,
                        callback_data: &a.token,
                    })
                    .collect()],
            })
        };
        Self {
            chat_id: message.chat_id,
            text: &message.text,
            reply_markup,
        }
    }
}

/// Telegram channel connector: long-polls for updates and sends messages via sendMessage.
pub struct TelegramChannel {
    id: String,
    token: String,
    api_base: String,
    poll_timeout_secs: u64,
    running: AtomicBool,
    shutdown: Notify,
    client: reqwest::Client,
}

impl TelegramChannel {
    /// Build the connector. `proxy` accepts any URL reqwest understands
    /// (`socks5://`, `http://`); Bot API calls are routed through it.
    pub fn new(
        token: impl Into<String>,
        api_base: &str,
        proxy: Option<&str>,
        poll_timeout_secs: u64,
    ) -> Result<Self, SendError> {
        let mut builder = reqwest::Client::builder();
        if let Some(url) = proxy {
            builder = builder.proxy(reqwest::Proxy::all(url)?);
        }
        Ok(Self {
            id: "telegram".to_string(),
            token: token.into(),
            api_base: api_base.trim_end_matches('/').to_string(),
            poll_timeout_secs,
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
            client: builder.build()?,
        })
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Decode a Bot API response, turning HTTP or `ok: false` failures into [`SendError::Api`].
    async fn read_result<T: DeserializeOwned>(
        method: &str,
        res: reqwest::Response,
    ) -> Result<Option<T>, SendError> {
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(SendError::Api(format!("{} failed: {} {}", method, status, body)));
        }
        let data: ApiResponse<T> = res.json().await?;
        if !data.ok {
            return Err(SendError::Api(format!(
                "{} returned ok: false ({})",
                method,
                data.description.unwrap_or_default()
            )));
        }
        Ok(data.result)
    }

    /// Call getMe to check that the token is accepted. Returns the bot account.
    pub async fn get_me(&self) -> Result<TelegramUser, SendError> {
        let res = self
            .client
            .get(self.method_url("getMe"))
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;
        Self::read_result::<TelegramUser>("getMe", res)
            .await?
            .ok_or_else(|| SendError::Api("getMe returned no result".to_string()))
    }

    /// Make one non-blocking getUpdates call so a token or webhook problem fails
    /// startup instead of the poll loop. Nothing is acknowledged, so pending
    /// updates are still delivered to the loop.
    pub async fn check_updates(&self) -> Result<(), SendError> {
        self.get_updates(None, 0).await.map(|_| ())
    }

    /// Start the getUpdates long-poll loop and forward events to the router loop.
    /// Bot API rejections while polling are reported to `alerts`.
    /// Returns a handle to await on shutdown.
    pub fn start_inbound(
        self: Arc<Self>,
        events_tx: mpsc::Sender<ChatEvent>,
        alerts: Arc<dyn AlertSink>,
    ) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("telegram channel: starting getUpdates long-poll loop");
        tokio::spawn(async move {
            run_get_updates_loop(self, events_tx, alerts).await;
        })
    }

    /// Call Telegram getUpdates, waiting up to `timeout_secs` for new updates.
    /// Returns (updates, next_offset).
    async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u64,
    ) -> Result<(Vec<TelegramUpdate>, Option<i64>), SendError> {
        let mut query = vec![
            ("timeout", timeout_secs.to_string()),
            ("allowed_updates", ALLOWED_UPDATES.to_string()),
        ];
        if let Some(off) = offset {
            query.push(("offset", off.to_string()));
        }
        let res = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .timeout(Duration::from_secs(timeout_secs) + SEND_TIMEOUT)
            .send()
            .await?;
        let updates: Vec<TelegramUpdate> = Self::read_result("getUpdates", res)
            .await?
            .unwrap_or_default();
        let next_offset = updates.iter().map(|u| u.update_id).max().map(|id| id + 1);
        Ok((updates, next_offset))
    }

    /// Acknowledge a button press so the client stops showing a progress indicator.
    pub async fn answer_callback_query(&self, query_id: &str) -> Result<(), SendError> {
        let res = self
            .client
            .post(self.method_url("answerCallbackQuery"))
            .json(&serde_json::json!({ "callback_query_id": query_id }))
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;
        Self::read_result::<serde_json::Value>("answerCallbackQuery", res).await?;
        Ok(())
    }

    /// Send a message via sendMessage API; actions become one row of inline callback buttons.
    pub async fn send_message(&self, message: &OutgoingMessage) -> Result<(), SendError> {
        let res = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessageRequest::from(message))
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;
        Self::read_result::<serde_json::Value>("sendMessage", res).await?;
        Ok(())
    }
}

async fn run_get_updates_loop(
    channel: Arc<TelegramChannel>,
    events_tx: mpsc::Sender<ChatEvent>,
    alerts: Arc<dyn AlertSink>,
) {
    let mut offset: Option<i64> = None;
    // Set while getUpdates keeps being rejected; one alert per failing streak.
    let mut rejected = false;
    while channel.running() {
        let polled = tokio::select! {
            res = channel.get_updates(offset, channel.poll_timeout_secs) => res,
            _ = channel.shutdown.notified() => break,
        };
        match polled {
            Ok((updates, next)) => {
                if rejected {
                    log::info!("telegram getUpdates recovered");
                    rejected = false;
                }
                if next.is_some() {
                    offset = next;
                }
                for update in updates {
                    if let Some(ref query) = update.callback_query {
                        if let Err(e) = channel.answer_callback_query(&query.id).await {
                            log::debug!("telegram answerCallbackQuery error: {}", e);
                        }
                    }
                    if events_tx.send(ChatEvent::from(update)).await.is_err() {
                        log::debug!("telegram: event channel closed, stopping loop");
                        return;
                    }
                }
            }
            Err(e @ SendError::Api(_)) => {
                if rejected {
                    log::warn!("telegram getUpdates error: {}", e);
                } else {
                    rejected = true;
                    alert::report(alerts.as_ref(), "telegram getUpdates error", &e).await;
                }
                retry_pause(&channel).await;
            }
            Err(e) => {
                log::warn!("telegram getUpdates error: {}", e);
                retry_pause(&channel).await;
            }
        }
    }
    log::info!("telegram channel: getUpdates loop stopped");
}

/// Back off between failed polls; returns early on stop().
async fn retry_pause(channel: &TelegramChannel) {
    tokio::select! {
        _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
        _ = channel.shutdown.notified() => {}
    }
}

#[async_trait]
impl ChannelHandle for TelegramChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), SendError> {
        TelegramChannel::send_message(self, message).await
    }
}
