//! Update router: classifies each chat event, updates focus, and decides the
//! chat reply and any queue publish.
//!
//! Events are handled one at a time by [`run_router_loop`], which owns the
//! [`FocusState`]; nothing else reads or writes it.

use crate::alert::{report, AlertSink};
use crate::channels::{ChannelHandle, ChatEvent, OutgoingMessage};
use crate::focus::FocusState;
use crate::publisher::{OutboundReply, PublishError, ReplyPublisher};
use std::sync::Arc;
use tokio::sync::mpsc;

pub const NO_FOCUS_REPLY: &str = "No one to write to";
pub const CLOSED_REPLY: &str = "You closed the active dialog";

fn replied_text(id: &str) -> String {
    format!("You replied to {}", id)
}

fn opened_text(id: &str) -> String {
    format!("You opened dialog with id {}", id)
}

/// Per-event faults. Neither stops the loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("permission denied: chat {chat_id} is not the authorized chat")]
    PermissionDenied { chat_id: i64 },
    #[error("empty update {update_id}: neither a text message nor a selection")]
    EmptyEvent { update_id: i64 },
}

/// What one routed event produced.
#[derive(Debug)]
pub struct RouteOutcome {
    /// Reply for the chat the event came from.
    pub reply: OutgoingMessage,
    /// Set when a reply was due for the queue but could not be published.
    pub publish_error: Option<PublishError>,
}

impl RouteOutcome {
    fn reply(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            reply: OutgoingMessage::text(chat_id, text),
            publish_error: None,
        }
    }
}

/// The routing state machine. Holds only read-only wiring; focus is passed in.
pub struct UpdateRouter {
    authorized_chat: i64,
    publisher: Arc<dyn ReplyPublisher>,
}

impl UpdateRouter {
    pub fn new(authorized_chat: i64, publisher: Arc<dyn ReplyPublisher>) -> Self {
        Self {
            authorized_chat,
            publisher,
        }
    }

    pub fn authorized_chat(&self) -> i64 {
        self.authorized_chat
    }

    /// Route one event against the current focus.
    ///
    /// Text from the authorized chat is published to the focused origin (or
    /// answered with "no one to write to"); text from any other chat is rejected
    /// without touching focus or the queue. A selection replaces focus with its
    /// token, or clears it for the close token.
    pub async fn route(
        &self,
        focus: &mut FocusState,
        event: ChatEvent,
    ) -> Result<RouteOutcome, RouteError> {
        match event {
            ChatEvent::TextMessage { chat_id, text } => {
                if chat_id != self.authorized_chat {
                    return Err(RouteError::PermissionDenied { chat_id });
                }
                let Some(id) = focus.focused() else {
                    return Ok(RouteOutcome::reply(chat_id, NO_FOCUS_REPLY));
                };
                let reply = OutboundReply {
                    target_id: id.to_string(),
                    body: text,
                };
                let publish_error = self.publisher.publish(&reply).await.err();
                Ok(RouteOutcome {
                    reply: OutgoingMessage::text(chat_id, replied_text(&reply.target_id)),
                    publish_error,
                })
            }
            ChatEvent::FocusSelection { chat_id, token } => {
                focus.select(&token);
                let text = match focus.focused() {
                    Some(id) => {
                        log::info!("focus set to {}", id);
                        opened_text(id)
                    }
                    None => {
                        log::info!("focus closed");
                        CLOSED_REPLY.to_string()
                    }
                };
                Ok(RouteOutcome::reply(chat_id, text))
            }
            ChatEvent::Empty { update_id } => Err(RouteError::EmptyEvent { update_id }),
        }
    }

    /// Route one event and carry out its side effects: report faults, send the reply.
    pub async fn handle_event(
        &self,
        focus: &mut FocusState,
        event: ChatEvent,
        channel: &dyn ChannelHandle,
        alerts: &dyn AlertSink,
    ) {
        let outcome = match self.route(focus, event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                report(alerts, "telegram update processor error", &e).await;
                return;
            }
        };
        if let Some(ref e) = outcome.publish_error {
            report(alerts, "failed to publish a message to the queue", e).await;
        }
        if let Err(e) = channel.send_message(&outcome.reply).await {
            report(alerts, "send message to telegram error", &e).await;
        }
    }
}

/// Consume chat events in order, each fully handled before the next is read.
/// Returns when the event channel closes.
pub async fn run_router_loop(
    router: UpdateRouter,
    channel: Arc<dyn ChannelHandle>,
    alerts: Arc<dyn AlertSink>,
    mut events_rx: mpsc::Receiver<ChatEvent>,
) {
    let mut focus = FocusState::default();
    log::info!("router loop started for chat {}", router.authorized_chat());
    while let Some(event) = events_rx.recv().await {
        router
            .handle_event(&mut focus, event, channel.as_ref(), alerts.as_ref())
            .await;
    }
    log::info!("router loop stopped");
}
