//! Inbound HTTP body: `{ "id", "name"?, "message" }`.

use serde::Deserialize;

/// One support request from the backend. `id` is opaque and echoed back with replies.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InboundRequest {
    #[serde(alias = "ID", alias = "Id")]
    pub id: String,
    /// Display name of the requester; blank names are treated as absent,
    /// anything else is passed through untouched.
    #[serde(default, alias = "Name")]
    pub name: Option<String>,
    #[serde(default, alias = "Message")]
    pub message: String,
}

impl InboundRequest {
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("parse request error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("parse request error: id is empty")]
    EmptyId,
}

/// Decode a raw request body.
pub fn decode_request(body: &[u8]) -> Result<InboundRequest, DecodeError> {
    let request: InboundRequest = serde_json::from_slice(body)?;
    if request.id.trim().is_empty() {
        return Err(DecodeError::EmptyId);
    }
    Ok(request)
}
