//! POST /bot/send: backend request -> chat notification.

use crate::alert::{report, AlertSink};
use crate::channels::{ChannelHandle, SendError};
use crate::gateway::protocol::{decode_request, DecodeError};
use crate::notify::format_notification;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

/// Shared, read-only state for inbound handlers.
#[derive(Clone)]
pub struct InboundState {
    /// Destination chat for notifications.
    pub chat_id: i64,
    pub channel: Arc<dyn ChannelHandle>,
    pub alerts: Arc<dyn AlertSink>,
    /// Report failures to the caller instead of always answering 200.
    pub confirm_delivery: bool,
    /// Advertised in the health response.
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum InboundError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("handle request from backend error: {0}")]
    Send(#[from] SendError),
}

/// Routes served on the gateway port.
pub fn routes(state: InboundState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/bot/send", post(send_http))
        .with_state(state)
}

/// Decode one request, format it and send the notification. Decode failures are
/// logged; send failures are logged and alerted. Nothing is retried.
pub async fn handle_request(state: &InboundState, body: &[u8]) -> Result<(), InboundError> {
    let request = match decode_request(body) {
        Ok(r) => r,
        Err(e) => {
            log::warn!("{}", e);
            return Err(e.into());
        }
    };
    let message = format_notification(&request.id, request.display_name(), &request.message)
        .into_message(state.chat_id);
    if let Err(e) = state.channel.send_message(&message).await {
        report(state.alerts.as_ref(), "handle request from backend error", &e).await;
        return Err(e.into());
    }
    log::info!(
        "message sent to telegram. id: {}. text: {}",
        request.id,
        request.message
    );
    Ok(())
}

async fn send_http(State(state): State<InboundState>, body: Bytes) -> StatusCode {
    match handle_request(&state, &body).await {
        Ok(()) => StatusCode::OK,
        Err(_) if !state.confirm_delivery => StatusCode::OK,
        Err(InboundError::Decode(_)) => StatusCode::BAD_REQUEST,
        Err(InboundError::Send(_)) => StatusCode::BAD_GATEWAY,
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<InboundState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
    }))
}
