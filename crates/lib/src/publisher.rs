//! Reply publisher: operator replies serialized into an envelope and stored on the reply queue.

use async_nats::jetstream::{
    self,
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

/// Envelope discriminator so queue consumers can multiplex message kinds.
pub const BOT_RESPONSE: &str = "BOT_RESPONSE";
pub const CONTENT_TYPE: &str = "text/plain";
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// Operator reply addressed to the request origin it answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub target_id: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("serializing reply envelope: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("publish to {subject} failed: {reason}")]
    Publish { subject: String, reason: String },
    #[error("publish to {0} timed out")]
    Timeout(String),
}

/// Wire shape: `{"Type":"BOT_RESPONSE","Data":{"ID":..,"Message":..}}`.
#[derive(Debug, Serialize)]
struct ReplyEnvelope<'a> {
    #[serde(rename = "Type")]
    kind: &'static str,
    #[serde(rename = "Data")]
    data: ReplyData<'a>,
}

#[derive(Debug, Serialize)]
struct ReplyData<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    #[serde(rename = "Message")]
    message: &'a str,
}

/// Serialize a reply into its queue envelope.
pub fn encode_envelope(reply: &OutboundReply) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&ReplyEnvelope {
        kind: BOT_RESPONSE,
        data: ReplyData {
            id: &reply.target_id,
            message: &reply.body,
        },
    })
}

/// Publishes one reply; at most once, no retry. `Ok` means the reply was enqueued.
#[async_trait]
pub trait ReplyPublisher: Send + Sync {
    async fn publish(&self, reply: &OutboundReply) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum QueueSetupError {
    #[error("connecting to queue: {0}")]
    Connect(#[from] async_nats::ConnectError),
    #[error("creating stream {stream}: {reason}")]
    Stream { stream: String, reason: String },
}

/// Stream holding the reply subject. Work-queue retention keeps each reply
/// until one consumer acknowledges it.
pub fn stream_config(stream: &str, subject: &str) -> StreamConfig {
    StreamConfig {
        name: stream.to_string(),
        subjects: vec![subject.to_string()],
        retention: RetentionPolicy::WorkQueue,
        storage: StorageType::File,
        ..Default::default()
    }
}

/// Reply publisher backed by a JetStream subject; a reply counts as published
/// once the server acknowledges storing it.
#[derive(Clone)]
pub struct NatsReplyPublisher {
    js: jetstream::Context,
    subject: String,
}

impl NatsReplyPublisher {
    pub fn new(js: jetstream::Context, subject: impl Into<String>) -> Self {
        Self {
            js,
            subject: subject.into(),
        }
    }

    /// Connect to the queue server and make sure `stream` captures `subject`.
    /// Fails fast when the server is unreachable or has JetStream disabled.
    pub async fn connect(
        url: &str,
        credentials: Option<(String, String)>,
        stream: &str,
        subject: impl Into<String>,
    ) -> Result<Self, QueueSetupError> {
        let subject = subject.into();
        let mut options = async_nats::ConnectOptions::new().name("deskrelay");
        if let Some((user, password)) = credentials {
            options = options.user_and_password(user, password);
        }
        let client = options.connect(url).await?;
        log::info!("connected to queue at {}", url);

        let js = jetstream::new(client);
        js.get_or_create_stream(stream_config(stream, &subject))
            .await
            .map_err(|e| QueueSetupError::Stream {
                stream: stream.to_string(),
                reason: e.to_string(),
            })?;
        log::info!("stream {} ready for {}", stream, subject);
        Ok(Self::new(js, subject))
    }

    fn publish_error(&self, reason: impl ToString) -> PublishError {
        PublishError::Publish {
            subject: self.subject.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl ReplyPublisher for NatsReplyPublisher {
    async fn publish(&self, reply: &OutboundReply) -> Result<(), PublishError> {
        let payload = encode_envelope(reply)?;
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Content-Type", CONTENT_TYPE);

        let send = async {
            let ack = self
                .js
                .publish_with_headers(self.subject.clone(), headers, payload.into())
                .await
                .map_err(|e| self.publish_error(e))?;
            ack.await.map_err(|e| self.publish_error(e))
        };
        let ack = tokio::time::timeout(PUBLISH_TIMEOUT, send)
            .await
            .map_err(|_| PublishError::Timeout(self.subject.clone()))??;

        log::info!(
            "message stored in {} (seq {}). id: {}. text: {}",
            ack.stream,
            ack.sequence,
            reply.target_id,
            reply.body
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_keeps_consumer_field_names() {
        let reply = OutboundReply {
            target_id: "user-42".to_string(),
            body: "how can I help".to_string(),
        };
        let bytes = encode_envelope(&reply).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"Type":"BOT_RESPONSE","Data":{"ID":"user-42","Message":"how can I help"}}"#
        );
    }

    #[test]
    fn reply_stream_is_a_durable_work_queue() {
        let config = stream_config("BOT_RESPONSES", "bot.responses");
        assert_eq!(config.name, "BOT_RESPONSES");
        assert_eq!(config.subjects, vec!["bot.responses".to_string()]);
        assert_eq!(config.retention, RetentionPolicy::WorkQueue);
        assert_eq!(config.storage, StorageType::File);
    }

    #[test]
    fn envelope_escapes_body() {
        let reply = OutboundReply {
            target_id: "r1".to_string(),
            body: "line one\n\"quoted\"".to_string(),
        };
        let value: serde_json::Value =
            serde_json::from_slice(&encode_envelope(&reply).unwrap()).unwrap();
        assert_eq!(value["Data"]["Message"], "line one\n\"quoted\"");
    }
}
