//! Outbound side of a chat channel: message model and the handle trait.

use async_trait::async_trait;

/// Failure to deliver a message to the chat.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chat api error: {0}")]
    Api(String),
}

/// A labelled button bound to an opaque token. Pressing it yields a
/// [`ChatEvent::FocusSelection`](super::ChatEvent::FocusSelection) carrying the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub label: String,
    pub token: String,
}

impl Action {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// A message to send to one chat, optionally with actionable references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub actions: Vec<Action>,
}

impl OutgoingMessage {
    /// Plain text message with no actions.
    pub fn text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            text: text.into(),
            actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }
}

/// Handle to a running channel (stop, send message). Shared by the HTTP handler
/// and the router loop, so implementations must tolerate concurrent sends.
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "telegram").
    fn id(&self) -> &str;
    /// Stop the channel connector.
    fn stop(&self);
    /// Deliver one message.
    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), SendError>;
}
