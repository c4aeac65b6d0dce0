//! Deskrelay core library: relays backend support requests into a Telegram chat
//! and publishes the operator's replies to a message queue.

pub mod alert;
pub mod channels;
pub mod config;
pub mod focus;
pub mod gateway;
pub mod init;
pub mod notify;
pub mod publisher;
pub mod router;
