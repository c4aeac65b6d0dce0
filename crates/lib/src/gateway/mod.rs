//! Gateway: inbound HTTP from the backend plus relay startup.
//!
//! One port serves `POST /bot/send` (backend requests) and `GET /` (health).
//! [`run_relay`] wires the chat channel, the reply queue and the router loop behind it.

mod inbound;
mod protocol;
mod server;

pub use inbound::{handle_request, routes, InboundError, InboundState};
pub use protocol::{decode_request, DecodeError, InboundRequest};
pub use server::run_relay;
