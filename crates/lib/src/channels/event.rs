//! Inbound chat event: one update from the chat, already classified for the router.

/// A chat update reduced to the shapes the router understands.
///
/// Built once at the transport boundary so the router can match exhaustively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// Free text typed into a chat.
    TextMessage { chat_id: i64, text: String },
    /// An actionable reference was pressed; `token` is the reference's bound value.
    FocusSelection { chat_id: i64, token: String },
    /// An update carrying neither a text message nor a selection.
    Empty { update_id: i64 },
}
