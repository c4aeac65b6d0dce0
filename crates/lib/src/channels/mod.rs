//! Chat channel (Telegram).
//!
//! The channel turns Bot API updates into [`ChatEvent`]s for the router loop and
//! delivers [`OutgoingMessage`]s (notifications and router replies) to the chat.

mod event;
mod handle;
mod telegram;

pub use event::ChatEvent;
pub use handle::{Action, ChannelHandle, OutgoingMessage, SendError};
pub use telegram::{
    TelegramCallbackQuery, TelegramChannel, TelegramChat, TelegramMessage, TelegramUpdate,
    TelegramUser,
};
