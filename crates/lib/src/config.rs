//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.deskrelay/config.json`) and environment.
//! Environment variables override file values so secrets can stay out of the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Inbound HTTP settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Chat channel settings (Telegram).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Outbound reply queue.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Out-of-band fault alerts (email).
    #[serde(default)]
    pub alerts: AlertsConfig,
}

/// Gateway bind, port, and delivery-confirmation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// Port for inbound HTTP (default 8080).
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_gateway_bind")]
    pub bind: String,

    /// When true, POST /bot/send reports decode and chat send failures to the caller
    /// (400 / 502). Default false: the caller always gets 200.
    #[serde(default)]
    pub confirm_delivery: bool,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
            confirm_delivery: false,
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// The one chat that receives notifications and may drive replies. Overridden by TELEGRAM_CHAT_ID.
    pub chat_id: Option<i64>,
    /// Optional proxy for Bot API calls, e.g. "socks5://127.0.0.1:1080". Overridden by DESKRELAY_PROXY.
    pub proxy: Option<String>,
    /// Bot API base URL (tests point this at a local fake).
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    /// getUpdates long-poll timeout in seconds.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_telegram_api_base() -> String {
    TELEGRAM_API_BASE.to_string()
}

fn default_poll_timeout_secs() -> u64 {
    60
}

impl Default for TelegramChannelConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            proxy: None,
            api_base: default_telegram_api_base(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

/// Reply queue (NATS) config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueConfig {
    #[serde(default = "default_queue_url")]
    pub url: String,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Destination subject for reply envelopes.
    #[serde(default = "default_queue_name")]
    pub name: String,
    /// JetStream stream that stores the subject until the backend consumes it.
    /// Created on startup when missing.
    #[serde(default = "default_queue_stream")]
    pub stream: String,
}

fn default_queue_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_queue_name() -> String {
    "bot.responses".to_string()
}

fn default_queue_stream() -> String {
    "BOT_RESPONSES".to_string()
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            url: default_queue_url(),
            user: None,
            password: None,
            name: default_queue_name(),
            stream: default_queue_stream(),
        }
    }
}

/// SMTP alert config. Alerts are only mailed when host, from and to are all set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsConfig {
    pub smtp_host: Option<String>,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP login; defaults to `from` when unset.
    pub username: Option<String>,
    /// Overridden by DESKRELAY_ALERT_PASSWORD.
    pub password: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from: None,
            to: None,
        }
    }
}

/// Everything the relay needs resolved before it can start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelaySettings {
    pub bot_token: String,
    pub chat_id: i64,
    pub queue_url: String,
    pub queue_name: String,
    pub queue_stream: String,
}

/// Trimmed, non-empty value of an environment variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    env_value("TELEGRAM_BOT_TOKEN")
        .or_else(|| non_empty(config.channels.telegram.bot_token.as_ref()))
}

/// Resolve the authorized chat id: env TELEGRAM_CHAT_ID overrides config.
pub fn resolve_chat_id(config: &Config) -> Result<Option<i64>> {
    match env_value("TELEGRAM_CHAT_ID") {
        Some(raw) => raw
            .parse::<i64>()
            .map(Some)
            .with_context(|| format!("TELEGRAM_CHAT_ID is not a chat id: {}", raw)),
        None => Ok(config.channels.telegram.chat_id),
    }
}

/// Resolve the Bot API proxy: env DESKRELAY_PROXY overrides config.
pub fn resolve_telegram_proxy(config: &Config) -> Option<String> {
    env_value("DESKRELAY_PROXY").or_else(|| non_empty(config.channels.telegram.proxy.as_ref()))
}

/// Queue credentials (user, password) with env overrides.
pub fn resolve_queue_credentials(config: &Config) -> Option<(String, String)> {
    let user =
        env_value("DESKRELAY_QUEUE_USER").or_else(|| non_empty(config.queue.user.as_ref()))?;
    let password = env_value("DESKRELAY_QUEUE_PASSWORD")
        .or_else(|| non_empty(config.queue.password.as_ref()))
        .unwrap_or_default();
    Some((user, password))
}

/// Resolve the SMTP password: env DESKRELAY_ALERT_PASSWORD overrides config.
pub fn resolve_alert_password(config: &Config) -> Option<String> {
    env_value("DESKRELAY_ALERT_PASSWORD").or_else(|| non_empty(config.alerts.password.as_ref()))
}

/// Resolve the settings the relay cannot run without. Missing values are startup errors.
pub fn resolve_relay_settings(config: &Config) -> Result<RelaySettings> {
    let bot_token = resolve_telegram_token(config).context(
        "telegram bot token not configured (set channels.telegram.botToken or TELEGRAM_BOT_TOKEN)",
    )?;
    let chat_id = resolve_chat_id(config)?.context(
        "destination chat not configured (set channels.telegram.chatId or TELEGRAM_CHAT_ID)",
    )?;
    let queue_url = env_value("DESKRELAY_QUEUE_URL")
        .or_else(|| non_empty(Some(&config.queue.url)))
        .context("queue url is empty")?;
    let queue_name = env_value("DESKRELAY_QUEUE_NAME")
        .or_else(|| non_empty(Some(&config.queue.name)))
        .context("queue name is empty (set queue.name or DESKRELAY_QUEUE_NAME)")?;
    let queue_stream = env_value("DESKRELAY_QUEUE_STREAM")
        .or_else(|| non_empty(Some(&config.queue.stream)))
        .context("queue stream is empty (set queue.stream or DESKRELAY_QUEUE_STREAM)")?;
    Ok(RelaySettings {
        bot_token,
        chat_id,
        queue_url,
        queue_name,
        queue_stream,
    })
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("DESKRELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".deskrelay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path (or DESKRELAY_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}
