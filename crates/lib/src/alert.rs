//! Alerting sink: out-of-band fault notices (email), best effort.

use crate::config::{self, Config};
use async_trait::async_trait;
use lettre::message::{header::ContentType, Mailbox};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;
use std::time::Duration;

const ALERT_SUBJECT: &str = "Error on relay bot";
const SMTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives fault descriptions. Implementations swallow their own failures.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn alert(&self, message: &str);
}

/// Log a fault and forward it to the alert sink as `"<context>: <error>"`.
pub async fn report(
    alerts: &dyn AlertSink,
    context: &str,
    err: &(dyn std::error::Error + Send + Sync),
) {
    let text = format!("{}: {}", context, err);
    log::warn!("{}", text);
    alerts.alert(&text).await;
}

/// Used when no alert transport is configured; the fault is already logged by [`report`].
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn alert(&self, message: &str) {
        log::debug!("alert not mailed (alerts not configured): {}", message);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("invalid alert address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("building alert email: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("smtp: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// Mails each alert from a fixed sender to a fixed recipient over STARTTLS.
pub struct SmtpAlertSink {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl SmtpAlertSink {
    pub fn new(
        host: &str,
        port: u16,
        credentials: Option<(String, String)>,
        from: &str,
        to: &str,
    ) -> Result<Self, AlertError> {
        let from: Mailbox = from.parse()?;
        let to: Mailbox = to.parse()?;
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
            .port(port)
            .timeout(Some(SMTP_TIMEOUT));
        if let Some((user, password)) = credentials {
            builder = builder.credentials(Credentials::new(user, password));
        }
        Ok(Self {
            mailer: builder.build(),
            from,
            to,
        })
    }

    async fn try_send(&self, text: &str) -> Result<(), AlertError> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(ALERT_SUBJECT)
            .header(ContentType::TEXT_PLAIN)
            .body(text.to_string())?;
        self.mailer.send(email).await?;
        Ok(())
    }
}

#[async_trait]
impl AlertSink for SmtpAlertSink {
    async fn alert(&self, message: &str) {
        // Never routed back through `report`: a failing mailer must not alert about itself.
        match self.try_send(message).await {
            Ok(()) => log::info!("alert email sent"),
            Err(e) => log::warn!("alert email failed: {}", e),
        }
    }
}

/// SMTP sink when host, from and to are configured; otherwise log-only.
pub fn alert_sink_from_config(config: &Config) -> Arc<dyn AlertSink> {
    let alerts = &config.alerts;
    let (Some(host), Some(from), Some(to)) = (
        alerts.smtp_host.as_deref(),
        alerts.from.as_deref(),
        alerts.to.as_deref(),
    ) else {
        log::info!("alert email not configured; faults are only logged");
        return Arc::new(LogAlertSink);
    };
    let credentials = config::resolve_alert_password(config).map(|password| {
        let user = alerts.username.clone().unwrap_or_else(|| from.to_string());
        (user, password)
    });
    match SmtpAlertSink::new(host, alerts.smtp_port, credentials, from, to) {
        Ok(sink) => {
            log::info!("alert email enabled: {} -> {}", from, to);
            Arc::new(sink)
        }
        Err(e) => {
            log::warn!("alert email disabled: {}", e);
            Arc::new(LogAlertSink)
        }
    }
}
