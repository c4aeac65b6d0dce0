//! Notification formatter: inbound request -> chat text plus reply/close actions.

use crate::channels::{Action, OutgoingMessage};
use crate::focus::CLOSE_TOKEN;

pub const REPLY_LABEL: &str = "Reply";
pub const CLOSE_LABEL: &str = "Close";

/// Rendered notification for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub text: String,
    /// Selection token bound to the request (its id).
    pub token: String,
    /// Always two: reply/select with `token`, then close with [`CLOSE_TOKEN`].
    pub actions: Vec<Action>,
}

impl Notification {
    pub fn into_message(self, chat_id: i64) -> OutgoingMessage {
        OutgoingMessage::text(chat_id, self.text).with_actions(self.actions)
    }
}

/// Render a request as plain text. Fields are embedded verbatim (no markup), the
/// sender line only when a display name is given.
pub fn format_notification(id: &str, display_name: Option<&str>, body: &str) -> Notification {
    let mut text = String::from("New message\n");
    text.push_str("ID: ");
    text.push_str(id);
    text.push('\n');
    if let Some(name) = display_name {
        text.push_str("From: ");
        text.push_str(name);
        text.push('\n');
    }
    text.push_str("Message: ");
    text.push_str(body);

    Notification {
        text,
        token: id.to_string(),
        actions: vec![Action::new(REPLY_LABEL, id), Action::new(CLOSE_LABEL, CLOSE_TOKEN)],
    }
}
